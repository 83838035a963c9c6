use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const APP_DIR_NAME: &str = "wlaunch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config '{path}': {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to write config '{path}': {message}")]
    Write { path: PathBuf, message: String },
    #[error("invalid prefix table: {0}")]
    PrefixTable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_results: u16,
    pub script_dir: PathBuf,
    pub file_search_roots: Vec<PathBuf>,
    pub api_keys: ApiKeys,
    pub clipboard: ClipboardConfig,
    pub budgets: BudgetConfig,
    /// Provider key -> prefix. An empty prefix moves the provider into the default set.
    pub prefixes: BTreeMap<String, String>,
    pub ranking: RankWeights,
    pub web_search: Vec<WebSearchAlias>,
    pub system_commands: Vec<SystemCommandEntry>,
    #[serde(skip)]
    pub config_path: PathBuf,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub exchange_rates: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub max_entries: usize,
    pub poll_interval_ms: u64,
    pub ipc_timeout_ms: u64,
    pub ignore_patterns: Vec<String>,
    pub socket_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            poll_interval_ms: 500,
            ipc_timeout_ms: 150,
            ignore_patterns: Vec::new(),
            socket_path: None,
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub local_ms: u64,
    pub blocking_ms: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            local_ms: 40,
            blocking_ms: 2_500,
        }
    }
}

/// Ranker tuning. All values are plain multipliers/bonuses on the fuzzy score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankWeights {
    pub match_char: f64,
    pub contiguous: f64,
    pub word_boundary: f64,
    pub start: f64,
    pub gap_penalty: f64,
    pub max_gap_penalty: f64,
    pub recency: f64,
    pub pinned: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            match_char: 1.0,
            contiguous: 2.0,
            word_boundary: 3.0,
            start: 6.0,
            gap_penalty: 0.25,
            max_gap_penalty: 3.0,
            recency: 10.0,
            pinned: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchAlias {
    pub prefix: String,
    pub key: String,
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemCommandEntry {
    pub word: String,
    pub title: String,
    pub command: String,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = stable_config_dir();
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            max_results: 20,
            script_dir: config_dir.join("scripts"),
            file_search_roots: [
                "Documents",
                "Downloads",
                "Pictures",
                "Videos",
                "Music",
                "Desktop",
                "Projects",
            ]
            .iter()
            .map(|name| home.join(name))
            .collect(),
            api_keys: ApiKeys::default(),
            clipboard: ClipboardConfig::default(),
            budgets: BudgetConfig::default(),
            prefixes: BTreeMap::new(),
            ranking: RankWeights::default(),
            web_search: Vec::new(),
            system_commands: Vec::new(),
            config_path: config_dir.join("config.toml"),
            data_dir: stable_data_dir(),
        }
    }
}

impl Config {
    pub fn socket_path(&self) -> PathBuf {
        self.clipboard.socket_path.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(format!("{APP_DIR_NAME}-clipboard.sock"))
        })
    }

    pub fn clipboard_db_path(&self) -> PathBuf {
        self.clipboard
            .db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("clipboard.sqlite3"))
    }

    pub fn usage_path(&self) -> PathBuf {
        self.data_dir.join("usage.json")
    }

    pub fn recent_files_path(&self) -> PathBuf {
        self.data_dir.join("recent_files.json")
    }

    pub fn exchange_rates_path(&self) -> PathBuf {
        self.data_dir.join("exchange_rates.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

pub fn stable_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

pub fn stable_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Loads the config from `path`, or from the standard location when `None`.
/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => discover_config_path(),
    };

    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        parse(&path, &raw)?
    } else {
        Config::default()
    };
    config.config_path = path;

    for warning in validate(&mut config) {
        warn!(target: "wlaunch::config", "{warning}");
    }
    Ok(config)
}

pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = &config.config_path;
    let write_error = |message: String| ConfigError::Write {
        path: path.clone(),
        message,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
    }
    let encoded = if is_json(path) {
        serde_json::to_string_pretty(config).map_err(|e| write_error(e.to_string()))?
    } else {
        toml::to_string_pretty(config).map_err(|e| write_error(e.to_string()))?
    };
    std::fs::write(path, encoded).map_err(|e| write_error(e.to_string()))
}

fn discover_config_path() -> PathBuf {
    let dir = stable_config_dir();
    let toml_path = dir.join("config.toml");
    let json_path = dir.join("config.json");
    if !toml_path.exists() && json_path.exists() {
        return json_path;
    }
    toml_path
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("json5"))
}

pub fn parse(path: &Path, raw: &str) -> Result<Config, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    if is_json(path) {
        let mut config: Config = json5::from_str(raw).map_err(|e| parse_error(e.to_string()))?;
        // The first config format kept the key at the top level.
        if config.api_keys.gemini.is_none() {
            if let Ok(legacy) = json5::from_str::<LegacyKeys>(raw) {
                config.api_keys.gemini = legacy.gemini_api_key;
            }
        }
        Ok(config)
    } else {
        toml::from_str(raw).map_err(|e| parse_error(e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyKeys {
    gemini_api_key: Option<String>,
}

/// Resets out-of-range values to their defaults and reports what was reset.
pub fn validate(cfg: &mut Config) -> Vec<String> {
    let defaults = Config::default();
    let mut warnings = Vec::new();

    if !(5..=100).contains(&cfg.max_results) {
        warnings.push(format!(
            "max_results {} out of range 5..=100; using {}",
            cfg.max_results, defaults.max_results
        ));
        cfg.max_results = defaults.max_results;
    }
    if !(1..=10_000).contains(&cfg.clipboard.max_entries) {
        warnings.push(format!(
            "clipboard.max_entries {} out of range 1..=10000; using {}",
            cfg.clipboard.max_entries, defaults.clipboard.max_entries
        ));
        cfg.clipboard.max_entries = defaults.clipboard.max_entries;
    }
    if !(50..=10_000).contains(&cfg.clipboard.poll_interval_ms) {
        warnings.push(format!(
            "clipboard.poll_interval_ms {} out of range 50..=10000; using {}",
            cfg.clipboard.poll_interval_ms, defaults.clipboard.poll_interval_ms
        ));
        cfg.clipboard.poll_interval_ms = defaults.clipboard.poll_interval_ms;
    }
    if cfg.clipboard.ipc_timeout_ms == 0 {
        warnings.push("clipboard.ipc_timeout_ms must be positive".to_string());
        cfg.clipboard.ipc_timeout_ms = defaults.clipboard.ipc_timeout_ms;
    }
    if cfg.budgets.local_ms == 0 || cfg.budgets.blocking_ms == 0 {
        warnings.push("budgets must be positive; using defaults".to_string());
        cfg.budgets = defaults.budgets.clone();
    }
    if cfg.script_dir.as_os_str().is_empty() {
        warnings.push("script_dir is empty; using default".to_string());
        cfg.script_dir = defaults.script_dir.clone();
    }

    let weights = &cfg.ranking;
    let all_finite = [
        weights.match_char,
        weights.contiguous,
        weights.word_boundary,
        weights.start,
        weights.gap_penalty,
        weights.max_gap_penalty,
        weights.recency,
        weights.pinned,
    ]
    .iter()
    .all(|w| w.is_finite() && *w >= 0.0);
    if !all_finite || weights.match_char <= 0.0 {
        warnings.push("ranking weights must be finite and non-negative; using defaults".to_string());
        cfg.ranking = RankWeights::default();
    }

    let before = cfg.web_search.len();
    cfg.web_search.retain(|alias| {
        !alias.prefix.trim().is_empty()
            && !alias.key.trim().is_empty()
            && alias.url.contains("{query}")
    });
    if cfg.web_search.len() != before {
        warnings.push("dropped web_search aliases missing prefix, key or {query}".to_string());
    }

    warnings
}
