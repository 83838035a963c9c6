use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of a provider. The string form is what config files use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ProviderId {
    Apps,
    Calculator,
    Converter,
    WebSearch(String),
    Scripts,
    System,
    Clipboard,
    Windows,
    Processes,
    Vault,
    Network,
    Files,
    RecentFiles,
    Emoji,
    Ai,
}

impl ProviderId {
    pub fn key(&self) -> String {
        match self {
            Self::Apps => "apps".to_string(),
            Self::Calculator => "calculator".to_string(),
            Self::Converter => "converter".to_string(),
            Self::WebSearch(alias) => format!("web:{alias}"),
            Self::Scripts => "scripts".to_string(),
            Self::System => "system".to_string(),
            Self::Clipboard => "clipboard".to_string(),
            Self::Windows => "windows".to_string(),
            Self::Processes => "processes".to_string(),
            Self::Vault => "vault".to_string(),
            Self::Network => "network".to_string(),
            Self::Files => "files".to_string(),
            Self::RecentFiles => "recent".to_string(),
            Self::Emoji => "emoji".to_string(),
            Self::Ai => "ai".to_string(),
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if let Some(alias) = key.strip_prefix("web:") {
            let alias = alias.trim();
            if alias.is_empty() {
                return None;
            }
            return Some(Self::WebSearch(alias.to_ascii_lowercase()));
        }
        let id = match key.to_ascii_lowercase().as_str() {
            "apps" => Self::Apps,
            "calculator" => Self::Calculator,
            "converter" => Self::Converter,
            "scripts" => Self::Scripts,
            "system" => Self::System,
            "clipboard" => Self::Clipboard,
            "windows" => Self::Windows,
            "processes" => Self::Processes,
            "vault" => Self::Vault,
            "network" => Self::Network,
            "files" => Self::Files,
            "recent" => Self::RecentFiles,
            "emoji" => Self::Emoji,
            "ai" => Self::Ai,
            _ => return None,
        };
        Some(id)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.key()
    }
}

impl TryFrom<String> for ProviderId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown provider '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Launch,
    CopyText,
    OpenUrl,
    RunScript,
    SystemAction,
    Custom,
    None,
}

/// What happens when a candidate is selected. The executor matches on
/// every variant, so adding one is a compile error until it is handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Launch { command: String },
    CopyText { text: String },
    OpenUrl { target: String },
    RunScript { path: PathBuf, argument: String },
    SystemAction { command: String },
    Custom { provider: ProviderId, payload: String },
    /// Informational rows: inline messages and pending placeholders.
    None,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Launch { .. } => ActionKind::Launch,
            Self::CopyText { .. } => ActionKind::CopyText,
            Self::OpenUrl { .. } => ActionKind::OpenUrl,
            Self::RunScript { .. } => ActionKind::RunScript,
            Self::SystemAction { .. } => ActionKind::SystemAction,
            Self::Custom { .. } => ActionKind::Custom,
            Self::None => ActionKind::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub icon: String,
    pub score: f64,
    pub action: Action,
    /// Skips title matching in the ranker (calculator, converter, ...).
    pub always_show: bool,
    /// 0.0 (stale) ..= 1.0 (just used); feeds the additive recency bonus.
    pub recency: Option<f64>,
    pub pending: bool,
    pub provider: Option<ProviderId>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: String::new(),
            icon: String::new(),
            score: 0.0,
            action,
            always_show: false,
            recency: None,
            pending: false,
            provider: None,
        }
    }

    /// A non-actionable row carrying a message for the user.
    pub fn info(id: impl Into<String>, title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self::new(id, title, Action::None)
            .with_subtitle(subtitle)
            .with_icon("dialog-information")
            .pinned()
    }

    pub fn placeholder(provider: &ProviderId) -> Self {
        let mut candidate = Self::new(
            format!("pending:{provider}"),
            format!("Waiting for {provider}..."),
            Action::None,
        )
        .with_icon("content-loading")
        .pinned();
        candidate.pending = true;
        candidate.provider = Some(provider.clone());
        candidate
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_recency(mut self, recency: f64) -> Self {
        self.recency = Some(recency.clamp(0.0, 1.0));
        self
    }

    pub fn pinned(mut self) -> Self {
        self.always_show = true;
        self
    }

    pub fn is_actionable(&self) -> bool {
        self.action.kind() != ActionKind::None
    }
}

/// Collapses whitespace and cuts to `max_chars`, appending "..." when cut.
pub fn preview_text(value: &str, max_chars: usize) -> String {
    let single_line = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = single_line.chars().take(keep).collect();
    out.push_str("...");
    out
}
