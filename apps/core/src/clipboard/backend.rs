use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use thiserror::Error;

use super::store::ClipContent;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no clipboard tool available ({0})")]
    Unavailable(String),
    #[error("clipboard io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("'{program}' exited with {status}")]
    CommandFailed { program: String, status: String },
}

/// Access to the system clipboard.
pub trait ClipboardBackend: Send + Sync {
    fn read(&self) -> Result<Option<ClipContent>, BackendError>;

    fn write(&self, content: &ClipContent) -> Result<(), BackendError>;

    /// A long-running command that prints one line per clipboard change.
    /// `None` means the caller has to poll.
    fn watch_command(&self) -> Option<Command> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Wayland,
    X11,
}

/// Shells out to `wl-paste`/`wl-copy` on Wayland and `xclip` on X11.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    server: DisplayServer,
}

impl CommandBackend {
    pub fn new(server: DisplayServer) -> Self {
        Self { server }
    }

    pub fn detect() -> Result<Self, BackendError> {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty());
        if wayland && command_exists("wl-paste") {
            return Ok(Self::new(DisplayServer::Wayland));
        }
        let x11 = std::env::var_os("DISPLAY").is_some_and(|v| !v.is_empty());
        if x11 && command_exists("xclip") {
            return Ok(Self::new(DisplayServer::X11));
        }
        Err(BackendError::Unavailable(
            "install wl-clipboard (Wayland) or xclip (X11)".to_string(),
        ))
    }

    pub fn server(&self) -> DisplayServer {
        self.server
    }

    fn list_types(&self) -> Result<Vec<String>, BackendError> {
        let output = match self.server {
            DisplayServer::Wayland => run_capture("wl-paste", &["--list-types"])?,
            DisplayServer::X11 => {
                run_capture("xclip", &["-selection", "clipboard", "-o", "-t", "TARGETS"])?
            }
        };
        Ok(String::from_utf8_lossy(&output)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    fn read_type(&self, mime: &str) -> Result<Vec<u8>, BackendError> {
        match self.server {
            DisplayServer::Wayland => run_capture("wl-paste", &["--no-newline", "--type", mime]),
            DisplayServer::X11 => run_capture("xclip", &["-selection", "clipboard", "-o", "-t", mime]),
        }
    }
}

impl ClipboardBackend for CommandBackend {
    fn read(&self) -> Result<Option<ClipContent>, BackendError> {
        // An empty clipboard makes both tools exit non-zero.
        let Ok(types) = self.list_types() else {
            return Ok(None);
        };
        let has_text = types
            .iter()
            .any(|t| t.starts_with("text/plain") || t == "UTF8_STRING" || t == "STRING");
        if has_text {
            let mime = if self.server == DisplayServer::X11 {
                "UTF8_STRING"
            } else {
                "text/plain;charset=utf-8"
            };
            let bytes = self.read_type(mime).or_else(|_| self.read_type("text/plain"))?;
            return Ok(Some(ClipContent::text(String::from_utf8_lossy(&bytes).into_owned())));
        }
        if let Some(mime) = types.iter().find(|t| t.starts_with("image/")) {
            let bytes = self.read_type(mime)?;
            if bytes.is_empty() {
                return Ok(None);
            }
            return Ok(Some(ClipContent::image(mime.clone(), bytes)));
        }
        Ok(None)
    }

    fn write(&self, content: &ClipContent) -> Result<(), BackendError> {
        let mime = content.content_type().to_string();
        let (program, args): (&str, Vec<&str>) = match (self.server, content) {
            (DisplayServer::Wayland, ClipContent::Text { .. }) => ("wl-copy", vec![]),
            (DisplayServer::Wayland, ClipContent::Image { .. }) => {
                ("wl-copy", vec!["--type", mime.as_str()])
            }
            (DisplayServer::X11, ClipContent::Text { .. }) => {
                ("xclip", vec!["-selection", "clipboard", "-i"])
            }
            (DisplayServer::X11, ClipContent::Image { .. }) => {
                ("xclip", vec!["-selection", "clipboard", "-t", mime.as_str(), "-i"])
            }
        };

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.bytes())?;
        }
        // Both tools fork a server process and the parent exits once stdin closes.
        wait_success(program, &mut child)
    }

    fn watch_command(&self) -> Option<Command> {
        match self.server {
            DisplayServer::Wayland => {
                let mut command = Command::new("wl-paste");
                command.args(["--watch", "echo"]);
                Some(command)
            }
            DisplayServer::X11 if command_exists("clipnotify") => {
                let mut command = Command::new("clipnotify");
                command.arg("-l");
                Some(command)
            }
            DisplayServer::X11 => None,
        }
    }
}

fn run_capture(program: &str, args: &[&str]) -> Result<Vec<u8>, BackendError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_end(&mut output)?;
    }
    wait_success(program, &mut child)?;
    Ok(output)
}

fn wait_success(program: &str, child: &mut Child) -> Result<(), BackendError> {
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(BackendError::CommandFailed {
            program: program.to_string(),
            status: status.to_string(),
        })
    }
}

pub fn command_exists(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
