use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::clipboard::backend::is_executable;
use crate::clipboard::{BackendError, ClipContent, ClipboardBackend};
use crate::model::{Action, Candidate, ProviderId};
use crate::providers::RecentFilesLog;
use crate::registry::{ProviderError, Registry};
use crate::usage::UsageLog;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("candidate has no action")]
    NotActionable,
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("failed to open '{target}': {source}")]
    Open {
        target: String,
        source: std::io::Error,
    },
    #[error("clipboard write failed: {0}")]
    Clipboard(#[from] BackendError),
    #[error("script not found: {}", .0.display())]
    MissingScript(PathBuf),
    #[error("script is not executable: {}", .0.display())]
    NotExecutable(PathBuf),
    #[error("{} exited with {status}", path.display())]
    NonZeroExit { path: PathBuf, status: ExitStatus },
    #[error("no provider registered as '{0}'")]
    UnknownProvider(ProviderId),
    #[error("{provider}: {source}")]
    Provider {
        provider: ProviderId,
        source: ProviderError,
    },
}

/// A script started by `RunScript`; waiting on it reports a nonzero exit.
#[derive(Debug)]
pub struct PendingScript {
    path: PathBuf,
    child: Child,
}

impl PendingScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// `Ok(None)` while the script is still running.
    pub fn try_finish(&mut self) -> Result<Option<()>, ActionError> {
        let status = self.child.try_wait().map_err(|source| ActionError::Spawn {
            command: self.path.display().to_string(),
            source,
        })?;
        match status {
            None => Ok(None),
            Some(status) => self.check(status).map(Some),
        }
    }

    pub fn wait(mut self) -> Result<(), ActionError> {
        let status = self.child.wait().map_err(|source| ActionError::Spawn {
            command: self.path.display().to_string(),
            source,
        })?;
        self.check(status)
    }

    fn check(&self, status: ExitStatus) -> Result<(), ActionError> {
        if status.success() {
            debug!(path = %self.path.display(), "script finished");
            Ok(())
        } else {
            Err(ActionError::NonZeroExit {
                path: self.path.clone(),
                status,
            })
        }
    }
}

/// Turns a selected candidate into its side effect.
pub struct ActionExecutor {
    registry: Arc<Registry>,
    usage: Arc<UsageLog>,
    recent: Arc<RecentFilesLog>,
    clipboard: Option<Arc<dyn ClipboardBackend>>,
}

impl ActionExecutor {
    pub fn new(registry: Arc<Registry>, usage: Arc<UsageLog>, recent: Arc<RecentFilesLog>) -> Self {
        Self {
            registry,
            usage,
            recent,
            clipboard: None,
        }
    }

    pub fn with_clipboard(mut self, backend: Arc<dyn ClipboardBackend>) -> Self {
        self.clipboard = Some(backend);
        self
    }

    /// Runs the candidate's action. Only `RunScript` returns a handle; every
    /// other action has finished (or been detached) when this returns.
    pub fn execute(&self, candidate: &Candidate) -> Result<Option<PendingScript>, ActionError> {
        let result = self.dispatch(candidate);
        match &result {
            Ok(_) => info!(id = %candidate.id, kind = ?candidate.action.kind(), "action executed"),
            Err(err) => error!(id = %candidate.id, error = %err, "action failed"),
        }
        result
    }

    fn dispatch(&self, candidate: &Candidate) -> Result<Option<PendingScript>, ActionError> {
        match &candidate.action {
            Action::Launch { command } => {
                spawn_shell(command)?;
                self.usage.record(&candidate.id);
                Ok(None)
            }
            Action::SystemAction { command } => {
                spawn_shell(command)?;
                Ok(None)
            }
            Action::CopyText { text } => {
                let backend = self.clipboard.as_ref().ok_or_else(|| {
                    BackendError::Unavailable("no clipboard backend configured".to_string())
                })?;
                backend.write(&ClipContent::text(text.clone()))?;
                Ok(None)
            }
            Action::OpenUrl { target } => {
                self.open(target)?;
                Ok(None)
            }
            Action::RunScript { path, argument } => {
                let pending = run_script(path, argument)?;
                self.usage.record(&candidate.id);
                Ok(Some(pending))
            }
            Action::Custom { provider, payload } => {
                let registration = self
                    .registry
                    .find(provider)
                    .ok_or_else(|| ActionError::UnknownProvider(provider.clone()))?;
                registration
                    .provider
                    .execute(payload)
                    .map_err(|source| ActionError::Provider {
                        provider: provider.clone(),
                        source,
                    })?;
                Ok(None)
            }
            Action::None => Err(ActionError::NotActionable),
        }
    }

    fn open(&self, target: &str) -> Result<(), ActionError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ActionError::EmptyCommand);
        }
        open::that_detached(target).map_err(|source| ActionError::Open {
            target: target.to_string(),
            source,
        })?;
        let local = Path::new(target);
        if !target.contains("://") && local.exists() {
            self.recent.add(local);
        }
        Ok(())
    }
}

/// `sh -c` in its own process group with null stdio. A detached thread
/// reaps the child.
fn spawn_shell(command: &str) -> Result<(), ActionError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(ActionError::EmptyCommand);
    }
    let mut child = Command::new("sh")
        .args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|source| ActionError::Spawn {
            command: command.to_string(),
            source,
        })?;
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

fn run_script(path: &Path, argument: &str) -> Result<PendingScript, ActionError> {
    if !path.is_file() {
        return Err(ActionError::MissingScript(path.to_path_buf()));
    }
    if !is_executable(path) {
        return Err(ActionError::NotExecutable(path.to_path_buf()));
    }
    let child = Command::new(path)
        .arg(argument)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|source| ActionError::Spawn {
            command: path.display().to_string(),
            source,
        })?;
    Ok(PendingScript {
        path: path.to_path_buf(),
        child,
    })
}
