use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::model::{Candidate, ProviderId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("provider panicked")]
    Panicked,
    #[error("cancelled by a newer query")]
    Cancelled,
    #[error("action not supported by {0}")]
    Unsupported(ProviderId),
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// How a provider may be called from the keystroke path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    /// In-memory or near-instant lookups.
    Local,
    /// Subprocess, filesystem walk or network; runs off the interactive thread.
    Blocking,
}

/// Cooperative cancellation tied to a dispatch generation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    pub fn new(current: Arc<AtomicU64>, generation: u64) -> Self {
        Self {
            current,
            generation,
        }
    }

    pub fn never() -> Self {
        Self::new(Arc::new(AtomicU64::new(0)), 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.generation
    }
}

/// What a provider sees of one keystroke.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw: String,
    /// The reserved token that selected this provider, if any.
    pub prefix: Option<String>,
    pub residual: String,
    pub cancel: CancelToken,
}

impl QueryContext {
    pub fn new(residual: impl Into<String>) -> Self {
        let residual = residual.into();
        Self {
            raw: residual.clone(),
            prefix: None,
            residual,
            cancel: CancelToken::never(),
        }
    }
}

pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError>;

    /// Loads or refreshes caches. Called at startup and on explicit rescan,
    /// never per keystroke.
    fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn latency(&self) -> Latency {
        Latency::Local
    }

    /// Whether the dispatcher should attach usage-based recency.
    fn tracks_usage(&self) -> bool {
        false
    }

    /// Runs an `Action::Custom` payload produced by this provider.
    fn execute(&self, _payload: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(self.id()))
    }
}

#[derive(Clone)]
pub struct Registration {
    /// `None` makes the provider a member of the default set.
    pub prefix: Option<String>,
    pub priority: i32,
    pub provider: Arc<dyn Provider>,
}

impl Registration {
    pub fn new(prefix: Option<&str>, priority: i32, provider: Arc<dyn Provider>) -> Self {
        Self {
            prefix: prefix
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            priority,
            provider,
        }
    }

    pub fn id(&self) -> ProviderId {
        self.provider.id()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("prefix", &self.prefix)
            .field("priority", &self.priority)
            .field("provider", &self.id())
            .finish()
    }
}

/// Read-only after construction; rescans refresh provider caches, not the table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Registration>,
}

impl Registry {
    pub fn new(entries: Vec<Registration>) -> Result<Self, ConfigError> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &entries {
            let Some(prefix) = entry.prefix.as_deref() else {
                continue;
            };
            if prefix.chars().any(char::is_whitespace) {
                return Err(ConfigError::PrefixTable(format!(
                    "prefix '{prefix}' contains whitespace"
                )));
            }
            if seen.contains(&prefix) {
                return Err(ConfigError::PrefixTable(format!(
                    "prefix '{prefix}' is registered more than once"
                )));
            }
            seen.push(prefix);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Registration] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Registration> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: &ProviderId) -> Option<&Registration> {
        self.entries.iter().find(|entry| &entry.id() == id)
    }

    /// Warms every distinct provider once; failures are logged, not fatal.
    pub fn rescan(&self) -> usize {
        let mut warmed: Vec<ProviderId> = Vec::new();
        let mut failures = 0;
        for entry in &self.entries {
            let id = entry.id();
            if warmed.contains(&id) {
                continue;
            }
            match entry.provider.warm_up() {
                Ok(()) => debug!(provider = %id, "warm-up complete"),
                Err(error) => {
                    failures += 1;
                    warn!(provider = %id, %error, "warm-up failed");
                }
            }
            warmed.push(id);
        }
        failures
    }
}
