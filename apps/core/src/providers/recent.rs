use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::contains_folded;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};

pub const MAX_RECENT: usize = 100;

/// Paths opened through the launcher, most recent first, persisted as a
/// JSON array. Shared between the provider and the action executor.
#[derive(Debug)]
pub struct RecentFilesLog {
    path: Option<PathBuf>,
    entries: Mutex<Vec<PathBuf>>,
}

impl RecentFilesLog {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Vec<PathBuf>>(&raw).unwrap_or_else(|error| {
                warn!(path = %path.display(), %error, "ignoring corrupt recent files list");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<PathBuf> {
        self.entries.lock().clone()
    }

    /// Moves `file` to the front, trimming the list to `MAX_RECENT`.
    pub fn add(&self, file: &Path) {
        let file = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());
        let mut entries = self.entries.lock();
        entries.retain(|existing| existing != &file);
        entries.insert(0, file);
        entries.truncate(MAX_RECENT);
        self.persist(&entries);
    }

    /// Drops entries whose file no longer exists and returns the survivors.
    pub fn prune_missing(&self) -> Vec<PathBuf> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|path| path.exists());
        if entries.len() != before {
            debug!(removed = before - entries.len(), "pruned missing recent files");
            self.persist(&entries);
        }
        entries.clone()
    }

    fn persist(&self, entries: &[PathBuf]) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let encoded = serde_json::to_string_pretty(entries).map_err(std::io::Error::other)?;
            std::fs::write(path, encoded)
        })();
        if let Err(error) = result {
            warn!(path = %path.display(), %error, "failed to save recent files");
        }
    }
}

pub struct RecentFiles {
    log: Arc<RecentFilesLog>,
}

impl RecentFiles {
    pub fn new(log: Arc<RecentFilesLog>) -> Self {
        Self { log }
    }
}

impl Provider for RecentFiles {
    fn id(&self) -> ProviderId {
        ProviderId::RecentFiles
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let needle = query.residual.trim().to_lowercase();
        let entries = self.log.prune_missing();
        let total = entries.len().max(1) as f64;
        Ok(entries
            .iter()
            .enumerate()
            .filter(|(_, path)| contains_folded(&path.to_string_lossy(), &needle))
            .map(|(position, path)| {
                file_candidate("recent", path)
                    .with_recency(1.0 - position as f64 / total)
                    .pinned()
            })
            .collect())
    }
}

pub(crate) fn file_candidate(scope: &str, path: &Path) -> Candidate {
    let display = path.display().to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| display.clone());
    Candidate::new(
        format!("{scope}:{display}"),
        name,
        Action::OpenUrl {
            target: display.clone(),
        },
    )
    .with_subtitle(display)
    .with_icon(icon_for_path(path))
}

/// Freedesktop icon name guessed from the file extension.
pub fn icon_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "tiff" => "image-x-generic",
        "mp4" | "mkv" | "webm" | "avi" | "mov" => "video-x-generic",
        "mp3" | "flac" | "ogg" | "wav" | "opus" | "m4a" => "audio-x-generic",
        "pdf" => "application-pdf",
        "zip" | "tar" | "gz" | "xz" | "zst" | "bz2" | "7z" | "rar" => "package-x-generic",
        _ => "text-x-generic",
    }
}
