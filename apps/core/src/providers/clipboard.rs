use tracing::debug;

use crate::clipboard::protocol::EntryDto;
use crate::clipboard::{ClientError, ClipboardClient};
use crate::model::{preview_text, Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};
use crate::usage::now_epoch_secs;

const TITLE_CHARS: usize = 60;

/// History rows read from the clipboard daemon. No daemon, no rows.
pub struct ClipboardHistory {
    client: ClipboardClient,
}

impl ClipboardHistory {
    pub fn new(client: ClipboardClient) -> Self {
        Self { client }
    }
}

impl Provider for ClipboardHistory {
    fn id(&self) -> ProviderId {
        ProviderId::Clipboard
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let entries = match self.client.query(query.residual.trim(), None) {
            Ok(entries) => entries,
            Err(ClientError::DaemonUnavailable(reason)) => {
                debug!(%reason, "clipboard daemon unavailable");
                return Ok(Vec::new());
            }
            Err(error) => return Err(ProviderError::new(error.to_string())),
        };

        if entries.is_empty() {
            let (title, subtitle) = if query.residual.trim().is_empty() {
                ("Clipboard history is empty", "Copy something first!")
            } else {
                ("No clipboard entries match", "Try a shorter filter")
            };
            return Ok(vec![Candidate::info("clip:empty", title, subtitle)]);
        }

        let now = now_epoch_secs();
        let total = entries.len();
        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| to_candidate(entry, position, total, now))
            .collect())
    }

    fn execute(&self, payload: &str) -> Result<(), ProviderError> {
        let sequence_id: u64 = payload
            .parse()
            .map_err(|_| ProviderError::new(format!("bad clipboard entry id '{payload}'")))?;
        self.client
            .restore(sequence_id)
            .map_err(|e| ProviderError::new(e.to_string()))
    }
}

/// Most recent first; recency falls off linearly with position.
fn to_candidate(entry: EntryDto, position: usize, total: usize, now: i64) -> Candidate {
    let recency = 1.0 - position as f64 / total.max(1) as f64;
    let age = relative_age(entry.created_epoch_ms / 1000, now);
    let id = format!("clip:{}", entry.sequence_id);
    let title = preview_text(&entry.preview, TITLE_CHARS);

    let (action, icon) = match entry.text {
        Some(text) => (Action::CopyText { text }, "edit-paste"),
        None => (
            Action::Custom {
                provider: ProviderId::Clipboard,
                payload: entry.sequence_id.to_string(),
            },
            "image-x-generic",
        ),
    };
    Candidate::new(id, title, action)
        .with_subtitle(format!("Copied {age}"))
        .with_icon(icon)
        .with_recency(recency)
        .pinned()
}

fn relative_age(captured_epoch_secs: i64, now: i64) -> String {
    let age = now.saturating_sub(captured_epoch_secs);
    if age < 60 {
        return "just now".to_string();
    }
    if age < 3600 {
        return format!("{}m ago", age / 60);
    }
    if age < 86_400 {
        return format!("{}h ago", age / 3600);
    }
    format!("{}d ago", age / 86_400)
}
