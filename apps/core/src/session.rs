use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::dispatcher::{Dispatcher, ProviderBatch, ProviderFailure};
use crate::model::Candidate;
use crate::ranker::RankEntry;
use crate::registry::{CancelToken, Latency, ProviderError};

/// Interactive, last-query-wins dispatch.
///
/// Each `submit` starts a new generation. Local providers answer inside the
/// call; blocking providers run on workers and their batches are accepted by
/// `poll` only while their generation is still current.
pub struct QuerySession {
    dispatcher: Arc<Dispatcher>,
    generation: Arc<AtomicU64>,
    tx: Sender<ProviderBatch>,
    rx: Receiver<ProviderBatch>,
    state: GenerationState,
    stale_discarded: u64,
}

#[derive(Debug, Default)]
struct GenerationState {
    generation: u64,
    residual: String,
    /// Registry index -> ranked inputs, so merge order never depends on arrival.
    answered: BTreeMap<usize, Vec<RankEntry>>,
    /// Registry index -> deadline.
    in_flight: BTreeMap<usize, Instant>,
    failures: Vec<ProviderFailure>,
    candidates: Vec<Candidate>,
}

impl QuerySession {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            dispatcher,
            generation: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            state: GenerationState::default(),
            stale_discarded: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.state.candidates
    }

    pub fn failures(&self) -> &[ProviderFailure] {
        &self.state.failures
    }

    pub fn is_settled(&self) -> bool {
        self.state.in_flight.is_empty()
    }

    /// Starts a new generation for `raw` and returns the first snapshot.
    pub fn submit(&mut self, raw: &str) -> &[Candidate] {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancelToken::new(Arc::clone(&self.generation), generation);
        let route = self.dispatcher.route(raw);
        let context = self.dispatcher.context_for(raw, &route, cancel);

        let registry = Arc::clone(self.dispatcher.registry());
        let (blocking, local): (Vec<usize>, Vec<usize>) =
            route.selected.iter().copied().partition(|&index| {
                registry
                    .get(index)
                    .is_some_and(|entry| entry.provider.latency() == Latency::Blocking)
            });

        let started = Instant::now();
        let deadline = started + self.dispatcher.budgets().blocking;
        let mut in_flight = BTreeMap::new();
        for index in blocking {
            self.dispatcher.spawn(index, context.clone(), self.tx.clone());
            in_flight.insert(index, deadline);
        }

        let (answered, failures) = self.dispatcher.collect(&local, &context);
        let answered: BTreeMap<usize, Vec<RankEntry>> = answered.into_iter().collect();

        debug!(generation, query = raw, in_flight = in_flight.len(), "query submitted");
        self.state = GenerationState {
            generation,
            residual: route.residual,
            answered,
            in_flight,
            failures,
            candidates: Vec::new(),
        };
        self.rerank();
        &self.state.candidates
    }

    /// Waits up to `timeout` for worker batches. Returns true when the
    /// visible list changed.
    pub fn poll(&mut self, timeout: Duration) -> bool {
        let until = Instant::now() + timeout;
        let mut changed = false;
        loop {
            changed |= self.expire_overdue();
            if self.state.in_flight.is_empty() {
                return changed;
            }
            let now = Instant::now();
            if now >= until && changed {
                return true;
            }
            let next_deadline = self
                .state
                .in_flight
                .values()
                .min()
                .copied()
                .unwrap_or(until);
            let wait = until.min(next_deadline).saturating_duration_since(now);
            match self.rx.recv_timeout(wait) {
                Ok(batch) => {
                    changed |= self.accept(batch);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if Instant::now() >= until {
                        return changed | self.expire_overdue();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return changed,
            }
        }
    }

    /// Polls until every in-flight provider answered or timed out.
    pub fn settle(&mut self) -> &[Candidate] {
        while !self.is_settled() {
            self.poll(self.dispatcher.budgets().blocking);
        }
        &self.state.candidates
    }

    fn accept(&mut self, batch: ProviderBatch) -> bool {
        if batch.generation != self.state.generation
            || !self.state.in_flight.contains_key(&batch.index)
        {
            self.stale_discarded += 1;
            debug!(
                generation = batch.generation,
                current = self.state.generation,
                "discarded stale provider batch"
            );
            return false;
        }

        self.state.in_flight.remove(&batch.index);
        match batch.result {
            Ok(candidates) => {
                let entries = self.dispatcher.tag(batch.index, candidates);
                self.state.answered.insert(batch.index, entries);
            }
            Err(error) => {
                if let Some(failure) = self.dispatcher.record_failure(batch.index, error) {
                    self.state.failures.push(failure);
                }
            }
        }
        self.rerank();
        true
    }

    fn expire_overdue(&mut self) -> bool {
        let now = Instant::now();
        let overdue: Vec<usize> = self
            .state
            .in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(index, _)| *index)
            .collect();
        if overdue.is_empty() {
            return false;
        }
        let budget = self.dispatcher.budgets().blocking;
        for index in overdue {
            self.state.in_flight.remove(&index);
            if let Some(failure) = self
                .dispatcher
                .record_failure(index, ProviderError::TimedOut(budget))
            {
                self.state.failures.push(failure);
            }
        }
        self.rerank();
        true
    }

    fn rerank(&mut self) {
        let entries: Vec<RankEntry> = self.state.answered.values().flatten().cloned().collect();
        let mut candidates = self.dispatcher.finish(entries, &self.state.residual);
        let registry = self.dispatcher.registry();
        for index in self.state.in_flight.keys() {
            if let Some(registration) = registry.get(*index) {
                candidates.push(Candidate::placeholder(&registration.id()));
            }
        }
        self.state.candidates = candidates;
    }
}

impl Drop for QuerySession {
    fn drop(&mut self) {
        // Any worker still running sees itself cancelled.
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
