use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

const HALF_LIFE_SECS: f64 = 3.0 * 86_400.0;
const MAX_ENTRIES: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub count: u32,
    pub last_used_epoch_secs: i64,
}

/// Launch counts keyed by candidate id, persisted as JSON.
#[derive(Debug, Default)]
pub struct UsageLog {
    path: Option<PathBuf>,
    records: Mutex<HashMap<String, UsageRecord>>,
}

impl UsageLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A missing or corrupt file yields an empty log.
    pub fn open(path: &Path) -> Self {
        let records = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<HashMap<String, UsageRecord>>(&raw).ok())
            .unwrap_or_default();
        Self {
            path: Some(path.to_path_buf()),
            records: Mutex::new(records),
        }
    }

    pub fn record(&self, id: &str) {
        self.record_at(id, now_epoch_secs());
    }

    pub fn record_at(&self, id: &str, epoch_secs: i64) {
        let snapshot = {
            let mut records = self.records.lock();
            let entry = records.entry(id.to_string()).or_insert(UsageRecord {
                count: 0,
                last_used_epoch_secs: epoch_secs,
            });
            entry.count = entry.count.saturating_add(1);
            entry.last_used_epoch_secs = entry.last_used_epoch_secs.max(epoch_secs);
            prune(&mut records);
            records.clone()
        };
        if let Err(error) = self.persist(&snapshot) {
            warn!(%error, "failed to persist usage log");
        }
    }

    pub fn get(&self, id: &str) -> Option<UsageRecord> {
        self.records.lock().get(id).copied()
    }

    /// 0.0 for never used, approaching 1.0 for frequent recent use.
    pub fn recency(&self, id: &str) -> f64 {
        self.recency_at(id, now_epoch_secs())
    }

    pub fn recency_at(&self, id: &str, now: i64) -> f64 {
        let Some(record) = self.get(id) else {
            return 0.0;
        };
        let age = now.saturating_sub(record.last_used_epoch_secs).max(0) as f64;
        let decay = 0.5_f64.powf(age / HALF_LIFE_SECS);
        let frequency = 1.0 - 1.0 / (1.0 + f64::from(record.count));
        (decay * (0.5 + 0.5 * frequency)).clamp(0.0, 1.0)
    }

    fn persist(&self, records: &HashMap<String, UsageRecord>) -> Result<(), std::io::Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string(records)?;
        std::fs::write(path, encoded)
    }
}

fn prune(records: &mut HashMap<String, UsageRecord>) {
    if records.len() <= MAX_ENTRIES {
        return;
    }
    let mut by_age: Vec<(String, i64)> = records
        .iter()
        .map(|(id, record)| (id.clone(), record.last_used_epoch_secs))
        .collect();
    by_age.sort_by_key(|(_, last)| *last);
    let excess = records.len() - MAX_ENTRIES;
    for (id, _) in by_age.into_iter().take(excess) {
        records.remove(&id);
    }
}

pub(crate) fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::UsageLog;

    #[test]
    fn recent_and_frequent_outranks_old() {
        let log = UsageLog::in_memory();
        let now = 10_000_000;
        log.record_at("app:firefox", now - 60);
        log.record_at("app:firefox", now - 30);
        log.record_at("app:gimp", now - 30 * 86_400);
        assert!(log.recency_at("app:firefox", now) > log.recency_at("app:gimp", now));
        assert_eq!(log.recency_at("app:unknown", now), 0.0);
    }

    #[test]
    fn persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        UsageLog::open(&path).record_at("app:code", 100);
        let reopened = UsageLog::open(&path);
        assert_eq!(reopened.get("app:code").map(|r| r.count), Some(1));
    }
}
