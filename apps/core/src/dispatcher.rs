use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Candidate, ProviderId};
use crate::ranker::{RankEntry, Ranker};
use crate::registry::{CancelToken, Latency, ProviderError, QueryContext, Registry};
use crate::router::{PrefixRouter, Route};
use crate::usage::UsageLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub local: Duration,
    pub blocking: Duration,
}

impl Budgets {
    pub fn from_config(config: &Config) -> Self {
        Self {
            local: Duration::from_millis(config.budgets.local_ms),
            blocking: Duration::from_millis(config.budgets.blocking_ms),
        }
    }

    pub fn for_latency(&self, latency: Latency) -> Duration {
        match latency {
            Latency::Local => self.local,
            Latency::Blocking => self.blocking,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub error: ProviderError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<ProviderFailure>,
}

/// One provider's answer, tagged with the registration that produced it.
#[derive(Debug)]
pub(crate) struct ProviderBatch {
    pub generation: u64,
    pub index: usize,
    pub result: Result<Vec<Candidate>, ProviderError>,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    router: PrefixRouter,
    ranker: Ranker,
    usage: Arc<UsageLog>,
    budgets: Budgets,
    max_results: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, config: &Config, usage: Arc<UsageLog>) -> Self {
        let router = PrefixRouter::new(&registry);
        Self {
            registry,
            router,
            ranker: Ranker::new(config.ranking.clone()),
            usage,
            budgets: Budgets::from_config(config),
            max_results: usize::from(config.max_results),
        }
    }

    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn budgets(&self) -> Budgets {
        self.budgets
    }

    pub fn route(&self, raw: &str) -> Route {
        self.router.route(raw)
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        self.resolve_with(raw, CancelToken::never())
    }

    /// Routes, fans out to every selected provider, then ranks the merged set.
    pub fn resolve_with(&self, raw: &str, cancel: CancelToken) -> Resolution {
        let route = self.route(raw);
        let context = self.context_for(raw, &route, cancel);
        let (answered, failures) = self.collect(&route.selected, &context);
        let entries = answered.into_iter().flat_map(|(_, entries)| entries).collect();
        Resolution {
            candidates: self.finish(entries, &route.residual),
            failures,
        }
    }

    pub(crate) fn context_for(&self, raw: &str, route: &Route, cancel: CancelToken) -> QueryContext {
        QueryContext {
            raw: raw.to_string(),
            prefix: route.prefix.clone(),
            residual: route.residual.clone(),
            cancel,
        }
    }

    /// Runs `indices` concurrently and waits for each until its own budget
    /// elapses. Entries come back in registry order regardless of arrival.
    pub(crate) fn collect(
        &self,
        indices: &[usize],
        context: &QueryContext,
    ) -> (Vec<(usize, Vec<RankEntry>)>, Vec<ProviderFailure>) {
        let started = Instant::now();
        let (tx, rx) = mpsc::channel();
        let mut pending: Vec<(usize, Instant)> = Vec::with_capacity(indices.len());
        for &index in indices {
            let Some(registration) = self.registry.get(index) else {
                continue;
            };
            let budget = self.budgets.for_latency(registration.provider.latency());
            pending.push((index, started + budget));
            self.spawn(index, context.clone(), tx.clone());
        }
        drop(tx);

        let mut answered: Vec<(usize, Result<Vec<Candidate>, ProviderError>)> = Vec::new();
        while !pending.is_empty() {
            let Some(deadline) = pending.iter().map(|(_, deadline)| *deadline).min() else {
                break;
            };
            let wait = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(batch) => {
                    if let Some(position) = pending.iter().position(|(i, _)| *i == batch.index) {
                        pending.swap_remove(position);
                        answered.push((batch.index, batch.result));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    pending.retain(|(index, deadline)| {
                        if *deadline > now {
                            return true;
                        }
                        answered.push((*index, Err(ProviderError::TimedOut(now - started))));
                        false
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for (index, _) in pending.drain(..) {
                        answered.push((index, Err(ProviderError::new("worker did not start"))));
                    }
                }
            }
        }

        answered.sort_by_key(|(index, _)| *index);
        let mut entries = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in answered {
            match result {
                Ok(candidates) => entries.push((index, self.tag(index, candidates))),
                Err(error) => failures.extend(self.record_failure(index, error)),
            }
        }
        (entries, failures)
    }

    pub(crate) fn spawn(&self, index: usize, context: QueryContext, tx: Sender<ProviderBatch>) {
        let Some(registration) = self.registry.get(index) else {
            return;
        };
        let provider = Arc::clone(&registration.provider);
        let generation = context.cancel.generation();
        let spawned = thread::Builder::new()
            .name(format!("provider-{}", provider.id()))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| provider.search(&context)))
                    .unwrap_or(Err(ProviderError::Panicked));
                // The receiver is gone once the budget elapsed; the batch is dropped.
                let _ = tx.send(ProviderBatch {
                    generation,
                    index,
                    result,
                });
            });
        if let Err(error) = spawned {
            warn!(%error, "failed to spawn provider worker");
        }
    }

    /// Stamps provider identity and usage recency onto fresh candidates.
    pub(crate) fn tag(&self, index: usize, candidates: Vec<Candidate>) -> Vec<RankEntry> {
        let Some(registration) = self.registry.get(index) else {
            return Vec::new();
        };
        let id = registration.id();
        let tracks_usage = registration.provider.tracks_usage();
        candidates
            .into_iter()
            .map(|mut candidate| {
                candidate.provider = Some(id.clone());
                if tracks_usage && candidate.recency.is_none() {
                    let recency = self.usage.recency(&candidate.id);
                    if recency > 0.0 {
                        candidate.recency = Some(recency);
                    }
                }
                RankEntry::new(candidate, registration.priority)
            })
            .collect()
    }

    pub(crate) fn record_failure(
        &self,
        index: usize,
        error: ProviderError,
    ) -> Option<ProviderFailure> {
        let provider = self.registry.get(index)?.id();
        if error == ProviderError::Cancelled {
            debug!(%provider, "provider call cancelled");
        } else {
            warn!(%provider, %error, "provider failed");
        }
        Some(ProviderFailure { provider, error })
    }

    pub(crate) fn finish(&self, entries: Vec<RankEntry>, residual: &str) -> Vec<Candidate> {
        let mut ranked = self.ranker.rank(entries, residual);
        ranked.truncate(self.max_results);
        ranked
    }
}
