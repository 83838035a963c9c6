use std::path::PathBuf;

use walkdir::{DirEntry, WalkDir};

use super::recent::file_candidate;
use crate::model::{Candidate, ProviderId};
use crate::registry::{Latency, Provider, ProviderError, QueryContext};

const SKIP_DIRS: &[&str] = &[".git", ".venv", "__pycache__", "node_modules", ".cache", "tmp", "target"];
const MIN_QUERY_CHARS: usize = 2;
const MAX_RESULTS: usize = 50;
const CANCEL_CHECK_EVERY: usize = 256;

/// Filename search under the configured roots. Walks the disk per query,
/// so it only runs off the keystroke path.
pub struct FileSearch {
    roots: Vec<PathBuf>,
}

impl FileSearch {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl Provider for FileSearch {
    fn id(&self) -> ProviderId {
        ProviderId::Files
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let needle = query.residual.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut visited = 0usize;
        for root in self.roots.iter().filter(|root| root.is_dir()) {
            let walker = WalkDir::new(root)
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry))
                .filter_map(Result::ok);
            for entry in walker {
                visited += 1;
                if visited % CANCEL_CHECK_EVERY == 0 && query.cancel.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if !name.contains(&needle) {
                    continue;
                }
                results.push(file_candidate("file", entry.path()));
                if results.len() >= MAX_RESULTS {
                    return Ok(results);
                }
            }
        }
        Ok(results)
    }

    fn latency(&self) -> Latency {
        Latency::Blocking
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIP_DIRS.contains(&&*name)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    use super::FileSearch;
    use crate::model::Action;
    use crate::registry::{CancelToken, Provider, ProviderError, QueryContext};

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("docs/Report-2024.pdf"), b"x").unwrap();
        std::fs::write(root.join("node_modules/pkg/report.js"), b"x").unwrap();
        std::fs::write(root.join(".hidden/report.txt"), b"x").unwrap();
        dir
    }

    #[test]
    fn finds_files_and_skips_build_and_hidden_dirs() {
        let dir = tree();
        let search = FileSearch::new(vec![dir.path().to_path_buf()]);
        let candidates = search.search(&QueryContext::new("report")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Report-2024.pdf");
        assert!(matches!(candidates[0].action, Action::OpenUrl { .. }));
    }

    #[test]
    fn short_queries_are_ignored() {
        let dir = tree();
        let search = FileSearch::new(vec![dir.path().to_path_buf()]);
        assert!(search.search(&QueryContext::new("r")).unwrap().is_empty());
    }

    #[test]
    fn stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..600 {
            std::fs::write(dir.path().join(format!("file-{i}.txt")), b"x").unwrap();
        }
        let generation = Arc::new(AtomicU64::new(2));
        let mut ctx = QueryContext::new("zz");
        ctx.cancel = CancelToken::new(generation, 1);

        let search = FileSearch::new(vec![dir.path().to_path_buf()]);
        match search.search(&ctx) {
            Err(ProviderError::Cancelled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
}
