use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::clipboard::backend::is_executable;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};

const SAMPLE_NAME: &str = "hello.sh";
const SAMPLE_BODY: &str = "#!/bin/sh\nnotify-send 'wlaunch' \"Hello from your script${1:+: $1}\"\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub title: String,
    pub path: PathBuf,
}

/// Executables dropped into the user's script directory.
pub struct ScriptRunner {
    dir: PathBuf,
    scripts: RwLock<Vec<Script>>,
}

impl ScriptRunner {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            scripts: RwLock::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scripts(&self) -> Vec<Script> {
        self.scripts.read().clone()
    }

    /// Creates the directory with one sample script on first use.
    fn ensure_dir(&self) -> std::io::Result<()> {
        if self.dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let sample = self.dir.join(SAMPLE_NAME);
        std::fs::write(&sample, SAMPLE_BODY)?;
        set_executable(&sample)?;
        info!(dir = %self.dir.display(), "created script directory with a sample script");
        Ok(())
    }
}

impl Provider for ScriptRunner {
    fn id(&self) -> ProviderId {
        ProviderId::Scripts
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let argument = query.residual.trim().to_string();
        Ok(self
            .scripts
            .read()
            .iter()
            .map(|script| {
                let file_name = script
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Candidate::new(
                    format!("script:{}", script.path.display()),
                    script.title.clone(),
                    Action::RunScript {
                        path: script.path.clone(),
                        argument: argument.clone(),
                    },
                )
                .with_subtitle(format!("User script ({file_name})"))
                .with_icon("text-x-script")
            })
            .collect())
    }

    fn warm_up(&self) -> Result<(), ProviderError> {
        if let Err(error) = self.ensure_dir() {
            warn!(dir = %self.dir.display(), %error, "could not create script directory");
        }
        let scripts = list_scripts(&self.dir)
            .map_err(|e| ProviderError::new(format!("cannot read {}: {e}", self.dir.display())))?;
        info!(scripts = scripts.len(), "script index rebuilt");
        *self.scripts.write() = scripts;
        Ok(())
    }

    fn tracks_usage(&self) -> bool {
        true
    }
}

/// Non-hidden executable files; the title is the file stem.
pub fn list_scripts(dir: &Path) -> std::io::Result<Vec<Script>> {
    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || !is_executable(&path) {
            continue;
        }
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
            .to_string();
        scripts.push(Script { title, path });
    }
    scripts.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    Ok(scripts)
}

fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::{list_scripts, set_executable, ScriptRunner};
    use crate::model::Action;
    use crate::registry::{Provider, QueryContext};

    #[test]
    fn lists_only_visible_executables() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup.sh");
        std::fs::write(&backup, "#!/bin/sh\n").unwrap();
        set_executable(&backup).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain").unwrap();
        let hidden = dir.path().join(".secret.sh");
        std::fs::write(&hidden, "#!/bin/sh\n").unwrap();
        set_executable(&hidden).unwrap();

        let scripts = list_scripts(dir.path()).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].title, "backup");
    }

    #[test]
    fn candidates_carry_the_residual_argument() {
        let dir = tempfile::tempdir().unwrap();
        let deploy = dir.path().join("deploy.sh");
        std::fs::write(&deploy, "#!/bin/sh\n").unwrap();
        set_executable(&deploy).unwrap();

        let runner = ScriptRunner::new(dir.path().to_path_buf());
        runner.warm_up().unwrap();
        let candidates = runner.search(&QueryContext::new("dep")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].action,
            Action::RunScript {
                path: deploy,
                argument: "dep".to_string()
            }
        );
    }

    #[test]
    fn first_warm_up_creates_sample() {
        let root = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(root.path().join("scripts"));
        runner.warm_up().unwrap();
        let scripts = runner.scripts();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].title, "hello");
    }
}
