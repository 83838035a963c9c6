#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use wlaunch_core::clipboard::{BackendError, ClipContent, ClipboardBackend};
use wlaunch_core::config::Config;
use wlaunch_core::dispatcher::{Budgets, Dispatcher};
use wlaunch_core::model::{Action, Candidate, ProviderId};
use wlaunch_core::registry::{Latency, Provider, ProviderError, QueryContext, Registration, Registry};
use wlaunch_core::usage::UsageLog;

pub fn launch(id: &str, title: &str) -> Candidate {
    Candidate::new(
        id,
        title,
        Action::Launch {
            command: "true".to_string(),
        },
    )
}

/// Returns the same rows for every query.
pub struct StaticProvider {
    pub id: ProviderId,
    pub rows: Vec<Candidate>,
    pub latency: Latency,
    pub tracks_usage: bool,
}

impl StaticProvider {
    pub fn new(id: ProviderId, rows: Vec<Candidate>) -> Self {
        Self {
            id,
            rows,
            latency: Latency::Local,
            tracks_usage: false,
        }
    }

    pub fn tracking_usage(mut self) -> Self {
        self.tracks_usage = true;
        self
    }
}

impl Provider for StaticProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn search(&self, _query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        Ok(self.rows.clone())
    }

    fn latency(&self) -> Latency {
        self.latency
    }

    fn tracks_usage(&self) -> bool {
        self.tracks_usage
    }
}

/// Sleeps, then answers with one pinned row echoing the residual. Gives up
/// early with `Cancelled` once a newer query supersedes it.
pub struct SlowProvider {
    pub id: ProviderId,
    pub delay: Duration,
    pub latency: Latency,
}

impl SlowProvider {
    pub fn blocking(id: ProviderId, delay: Duration) -> Self {
        Self {
            id,
            delay,
            latency: Latency::Blocking,
        }
    }

    pub fn local(id: ProviderId, delay: Duration) -> Self {
        Self {
            id,
            delay,
            latency: Latency::Local,
        }
    }
}

impl Provider for SlowProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let until = Instant::now() + self.delay;
        while Instant::now() < until {
            std::thread::sleep(Duration::from_millis(5));
        }
        if query.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(vec![launch(
            &format!("slow:{}", query.residual),
            &format!("{} result", query.residual),
        )
        .pinned()])
    }

    fn latency(&self) -> Latency {
        self.latency
    }
}

pub struct FailingProvider(pub ProviderId);

impl Provider for FailingProvider {
    fn id(&self) -> ProviderId {
        self.0.clone()
    }

    fn search(&self, _query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        Err(ProviderError::new("backend exploded"))
    }
}

pub struct PanickingProvider(pub ProviderId);

impl Provider for PanickingProvider {
    fn id(&self) -> ProviderId {
        self.0.clone()
    }

    fn search(&self, _query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        panic!("provider bug");
    }
}

/// Remembers the payloads its custom action receives.
#[derive(Default)]
pub struct RecordingProvider {
    pub executed: Mutex<Vec<String>>,
}

impl Provider for RecordingProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Windows
    }

    fn search(&self, _query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        Ok(Vec::new())
    }

    fn execute(&self, payload: &str) -> Result<(), ProviderError> {
        self.executed.lock().push(payload.to_string());
        Ok(())
    }
}

/// System clipboard stand-in.
#[derive(Default)]
pub struct MemoryBackend {
    pub current: Mutex<Option<ClipContent>>,
    pub writes: Mutex<Vec<ClipContent>>,
}

impl MemoryBackend {
    pub fn set(&self, content: ClipContent) {
        *self.current.lock() = Some(content);
    }
}

impl ClipboardBackend for MemoryBackend {
    fn read(&self) -> Result<Option<ClipContent>, BackendError> {
        Ok(self.current.lock().clone())
    }

    fn write(&self, content: &ClipContent) -> Result<(), BackendError> {
        self.writes.lock().push(content.clone());
        *self.current.lock() = Some(content.clone());
        Ok(())
    }
}

pub fn registry(entries: Vec<Registration>) -> Arc<Registry> {
    Arc::new(Registry::new(entries).unwrap())
}

pub fn dispatcher(registry: Arc<Registry>) -> Dispatcher {
    dispatcher_with(registry, &Config::default(), Arc::new(UsageLog::in_memory()))
}

pub fn dispatcher_with(registry: Arc<Registry>, config: &Config, usage: Arc<UsageLog>) -> Dispatcher {
    Dispatcher::new(registry, config, usage).with_budgets(Budgets {
        local: Duration::from_millis(200),
        blocking: Duration::from_millis(1_500),
    })
}
