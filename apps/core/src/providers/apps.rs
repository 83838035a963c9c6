use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};

const DEFAULT_ICON: &str = "application-x-executable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopApp {
    pub name: String,
    pub command: String,
    pub icon: String,
    pub comment: String,
    pub source: PathBuf,
}

/// Installed applications from XDG `.desktop` files. The list is rebuilt on
/// warm-up only; keystrokes read the cached copy.
pub struct AppLauncher {
    dirs: Vec<PathBuf>,
    apps: RwLock<Vec<DesktopApp>>,
}

impl AppLauncher {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            apps: RwLock::new(Vec::new()),
        }
    }

    pub fn from_xdg() -> Self {
        Self::new(xdg_application_dirs())
    }

    pub fn apps(&self) -> Vec<DesktopApp> {
        self.apps.read().clone()
    }

    pub fn scan(&self) -> usize {
        let apps = scan_dirs(&self.dirs);
        let count = apps.len();
        *self.apps.write() = apps;
        count
    }
}

impl Provider for AppLauncher {
    fn id(&self) -> ProviderId {
        ProviderId::Apps
    }

    fn search(&self, _query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let apps = self.apps.read();
        Ok(apps
            .iter()
            .map(|app| {
                Candidate::new(
                    format!("app:{}", app.name.to_lowercase()),
                    app.name.clone(),
                    Action::Launch {
                        command: app.command.clone(),
                    },
                )
                .with_subtitle(app.comment.clone())
                .with_icon(app.icon.clone())
            })
            .collect())
    }

    fn warm_up(&self) -> Result<(), ProviderError> {
        let count = self.scan();
        info!(apps = count, dirs = self.dirs.len(), "application index rebuilt");
        Ok(())
    }

    fn tracks_usage(&self) -> bool {
        true
    }
}

/// `$XDG_DATA_HOME` first so user entries shadow system ones.
pub fn xdg_application_dirs() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    match std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        Some(home) => roots.push(PathBuf::from(home)),
        None => roots.extend(dirs::data_dir()),
    }
    let system = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    roots.extend(system.split(':').filter(|s| !s.is_empty()).map(PathBuf::from));
    roots.push(PathBuf::from("/usr/share"));

    let mut seen = HashSet::new();
    roots
        .into_iter()
        .map(|root| root.join("applications"))
        .filter(|dir| seen.insert(dir.clone()))
        .collect()
}

pub fn scan_dirs(dirs: &[PathBuf]) -> Vec<DesktopApp> {
    let mut seen_names = HashSet::new();
    let mut apps = Vec::new();
    for dir in dirs.iter().filter(|dir| dir.is_dir()) {
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok);
        for entry in walker {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("desktop")
            {
                continue;
            }
            let Some(app) = read_desktop_file(path) else {
                continue;
            };
            if seen_names.insert(app.name.to_lowercase()) {
                apps.push(app);
            }
        }
    }
    apps.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    apps
}

fn read_desktop_file(path: &Path) -> Option<DesktopApp> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            debug!(path = %path.display(), %error, "skipping unreadable desktop file");
            return None;
        }
    };
    parse_desktop_entry(&raw, path)
}

/// Reads the `[Desktop Entry]` group. Hidden, NoDisplay, non-Application
/// entries and entries without Name or Exec yield `None`.
pub fn parse_desktop_entry(raw: &str, source: &Path) -> Option<DesktopApp> {
    let mut in_entry = false;
    let mut name = None;
    let mut exec = None;
    let mut icon = None;
    let mut comment = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => name = Some(value.to_string()),
            "Exec" => exec = Some(value.to_string()),
            "Icon" => icon = Some(value.to_string()),
            "Comment" => comment = Some(value.to_string()),
            "Type" if value != "Application" => return None,
            "NoDisplay" | "Hidden" if value.eq_ignore_ascii_case("true") => return None,
            _ => {}
        }
    }

    let name = name.filter(|n| !n.is_empty())?;
    let command = strip_field_codes(&exec?);
    if command.is_empty() {
        return None;
    }
    Some(DesktopApp {
        name,
        command,
        icon: icon.filter(|i| !i.is_empty()).unwrap_or_else(|| DEFAULT_ICON.to_string()),
        comment: comment.unwrap_or_default(),
        source: source.to_path_buf(),
    })
}

/// Drops `%u`, `%F` and friends from an Exec line.
pub fn strip_field_codes(exec: &str) -> String {
    exec.split_whitespace()
        .filter(|token| !token.starts_with('%'))
        .collect::<Vec<_>>()
        .join(" ")
}
