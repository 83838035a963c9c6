//! Concrete providers and the default registry table.

pub mod ai;
pub mod apps;
pub mod calculator;
pub mod clipboard;
pub mod converter;
pub mod emoji;
pub mod files;
pub mod network;
pub mod processes;
pub mod recent;
pub mod scripts;
pub mod system;
pub mod vault;
pub mod web_search;
pub mod windows;

use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clipboard::ClipboardClient;
use crate::config::{Config, ConfigError};
use crate::model::ProviderId;
use crate::registry::{CancelToken, Provider, ProviderError, Registration, Registry};

pub use ai::AiAssistant;
pub use apps::AppLauncher;
pub use calculator::Calculator;
pub use clipboard::ClipboardHistory;
pub use converter::UnitConverter;
pub use emoji::EmojiPicker;
pub use files::FileSearch;
pub use network::NetworkManager;
pub use processes::ProcessManager;
pub use recent::{RecentFiles, RecentFilesLog};
pub use scripts::ScriptRunner;
pub use system::SystemCommands;
pub use vault::VaultLookup;
pub use web_search::WebSearch;
pub use windows::WindowSwitcher;

pub const PRIORITY_DEFAULT: i32 = 100;
pub const PRIORITY_INSTANT_ANSWER: i32 = 120;
pub const PRIORITY_SCRIPTS: i32 = 80;
pub const PRIORITY_SYSTEM: i32 = 70;

/// One provider before it is flattened into registry rows.
pub struct ProviderSlot {
    pub provider: Arc<dyn Provider>,
    pub priority: i32,
    pub prefixes: Vec<String>,
    pub default_member: bool,
}

impl ProviderSlot {
    pub fn default_member(provider: Arc<dyn Provider>, priority: i32) -> Self {
        Self {
            provider,
            priority,
            prefixes: Vec::new(),
            default_member: true,
        }
    }

    pub fn prefixed(provider: Arc<dyn Provider>, priority: i32, prefix: &str) -> Self {
        Self {
            provider,
            priority,
            prefixes: vec![prefix.to_string()],
            default_member: false,
        }
    }

    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }
}

/// Shared state the executor also needs.
#[derive(Clone)]
pub struct ProviderDeps {
    pub recent: Arc<RecentFilesLog>,
    pub clipboard: ClipboardClient,
}

impl ProviderDeps {
    pub fn from_config(config: &Config) -> Self {
        Self {
            recent: Arc::new(RecentFilesLog::open(config.recent_files_path())),
            clipboard: ClipboardClient::new(
                config.socket_path(),
                Duration::from_millis(config.clipboard.ipc_timeout_ms),
            ),
        }
    }
}

/// The built-in providers in merge order.
pub fn standard_slots(config: &Config, deps: &ProviderDeps) -> Vec<ProviderSlot> {
    let system = Arc::new(SystemCommands::with_extra(&config.system_commands));
    let system_words = system.words();

    let mut slots = vec![
        ProviderSlot::default_member(Arc::new(AppLauncher::from_xdg()), PRIORITY_DEFAULT),
        ProviderSlot::default_member(Arc::new(Calculator), PRIORITY_INSTANT_ANSWER),
        ProviderSlot::default_member(
            Arc::new(UnitConverter::new(
                config.exchange_rates_path(),
                config.api_keys.exchange_rates.clone(),
            )),
            PRIORITY_INSTANT_ANSWER,
        ),
        ProviderSlot::default_member(
            Arc::new(ScriptRunner::new(config.script_dir.clone())),
            PRIORITY_SCRIPTS,
        ),
        ProviderSlot::default_member(system, PRIORITY_SYSTEM).with_prefixes(system_words),
        ProviderSlot::prefixed(
            Arc::new(ClipboardHistory::new(deps.clipboard.clone())),
            PRIORITY_DEFAULT,
            "cb",
        ),
    ];

    for alias in web_search::builtin_aliases()
        .into_iter()
        .chain(config.web_search.iter().cloned())
    {
        let prefix = alias.prefix.clone();
        slots.push(ProviderSlot::prefixed(
            Arc::new(WebSearch::from_alias(&alias)),
            PRIORITY_DEFAULT,
            &prefix,
        ));
    }

    slots.extend([
        ProviderSlot::prefixed(Arc::new(WindowSwitcher), PRIORITY_DEFAULT, "w"),
        ProviderSlot::prefixed(Arc::new(ProcessManager), PRIORITY_DEFAULT, "ps"),
        ProviderSlot::prefixed(Arc::new(VaultLookup), PRIORITY_DEFAULT, "bw"),
        ProviderSlot::prefixed(Arc::new(NetworkManager), PRIORITY_DEFAULT, "wifi"),
        ProviderSlot::prefixed(Arc::new(EmojiPicker), PRIORITY_DEFAULT, "e"),
        ProviderSlot::prefixed(
            Arc::new(RecentFiles::new(Arc::clone(&deps.recent))),
            PRIORITY_DEFAULT,
            "r",
        ),
        ProviderSlot::prefixed(
            Arc::new(FileSearch::new(config.file_search_roots.clone())),
            PRIORITY_DEFAULT,
            "f",
        ),
        ProviderSlot::prefixed(
            Arc::new(AiAssistant::new(config.api_keys.gemini.clone())),
            PRIORITY_DEFAULT,
            "ask",
        ),
    ]);
    slots
}

pub fn build_registry(config: &Config, deps: &ProviderDeps) -> Result<Registry, ConfigError> {
    assemble(standard_slots(config, deps), &config.prefixes)
}

/// Applies `[prefixes]` overrides and flattens slots into registry rows.
///
/// A non-empty override replaces every prefix of the named provider; an
/// empty one removes its prefixes and moves it into the default set.
pub fn assemble(
    mut slots: Vec<ProviderSlot>,
    overrides: &BTreeMap<String, String>,
) -> Result<Registry, ConfigError> {
    for (key, prefix) in overrides {
        let id = ProviderId::parse(key).ok_or_else(|| {
            ConfigError::PrefixTable(format!("unknown provider '{key}' in [prefixes]"))
        })?;
        let slot = slots
            .iter_mut()
            .find(|slot| slot.provider.id() == id)
            .ok_or_else(|| {
                ConfigError::PrefixTable(format!("provider '{key}' is not registered"))
            })?;
        let prefix = prefix.trim();
        slot.prefixes.clear();
        if prefix.is_empty() {
            slot.default_member = true;
        } else {
            slot.prefixes.push(prefix.to_string());
        }
        debug!(provider = %id, prefix, "prefix override applied");
    }

    let mut rows = Vec::new();
    for slot in slots {
        if slot.default_member {
            rows.push(Registration::new(None, slot.priority, Arc::clone(&slot.provider)));
        }
        for prefix in &slot.prefixes {
            rows.push(Registration::new(
                Some(prefix),
                slot.priority,
                Arc::clone(&slot.provider),
            ));
        }
    }
    Registry::new(rows)
}

/// Runs a command to completion, killing it once `timeout` passes or the
/// query that started it is superseded.
pub fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
    cancel: Option<&CancelToken>,
) -> Result<Output, ProviderError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProviderError::new(format!("failed to start '{program}': {e}")))?;

    // Drain pipes on helper threads so a chatty child cannot block on a full pipe.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(ProviderError::new(format!("'{program}' wait failed: {e}"))),
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProviderError::Cancelled);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProviderError::TimedOut(timeout));
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    let collect = |handle: Option<std::thread::JoinHandle<Vec<u8>>>| {
        handle
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    };
    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

/// Case-insensitive substring test used by the providers that filter
/// themselves instead of leaving it to the ranker.
pub(crate) fn contains_folded(haystack: &str, needle_lower: &str) -> bool {
    needle_lower.is_empty() || haystack.to_lowercase().contains(needle_lower)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{assemble, run_command, ProviderSlot};
    use crate::config::ConfigError;
    use crate::model::{Candidate, ProviderId};
    use crate::registry::{Provider, ProviderError, QueryContext};

    struct Named(ProviderId);

    impl Provider for Named {
        fn id(&self) -> ProviderId {
            self.0.clone()
        }

        fn search(&self, _query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn slots() -> Vec<ProviderSlot> {
        vec![
            ProviderSlot::default_member(Arc::new(Named(ProviderId::Apps)), 100),
            ProviderSlot::prefixed(Arc::new(Named(ProviderId::Emoji)), 100, "e"),
            ProviderSlot::prefixed(Arc::new(Named(ProviderId::Files)), 100, "f"),
        ]
    }

    #[test]
    fn override_replaces_prefix() {
        let mut overrides = BTreeMap::new();
        overrides.insert("emoji".to_string(), ":".to_string());
        let registry = assemble(slots(), &overrides).unwrap();

        let emoji = registry.find(&ProviderId::Emoji).unwrap();
        assert_eq!(emoji.prefix.as_deref(), Some(":"));
        assert!(registry
            .entries()
            .iter()
            .all(|entry| entry.prefix.as_deref() != Some("e")));
    }

    #[test]
    fn empty_override_moves_provider_into_default_set() {
        let mut overrides = BTreeMap::new();
        overrides.insert("files".to_string(), String::new());
        let registry = assemble(slots(), &overrides).unwrap();

        let files = registry.find(&ProviderId::Files).unwrap();
        assert_eq!(files.prefix, None);
    }

    #[test]
    fn override_collision_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert("emoji".to_string(), "f".to_string());
        match assemble(slots(), &overrides) {
            Err(ConfigError::PrefixTable(message)) => assert!(message.contains("'f'")),
            other => panic!("expected prefix table error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert("telepathy".to_string(), "t".to_string());
        assert!(matches!(
            assemble(slots(), &overrides),
            Err(ConfigError::PrefixTable(_))
        ));
    }

    #[test]
    fn run_command_captures_output() {
        let output = run_command("sh", &["-c", "echo hi"], Duration::from_secs(5), None).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hi");
    }

    #[test]
    fn run_command_kills_on_timeout() {
        match run_command("sh", &["-c", "sleep 5"], Duration::from_millis(50), None) {
            Err(ProviderError::TimedOut(_)) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
