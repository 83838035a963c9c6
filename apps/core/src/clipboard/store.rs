//! Bounded clipboard history persisted in SQLite.
//!
//! The daemon is the only writer. Every append runs in one transaction that
//! bumps the persisted sequence counter, inserts the row and trims overflow;
//! the in-memory snapshot is swapped only after commit, so readers never see
//! a half-written entry.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

pub const TEXT_CONTENT_TYPE: &str = "text";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid content type '{0}'")]
    ContentType(String),
}

/// What the system clipboard held at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipContent {
    Text { text: String },
    Image { mime: String, bytes: Vec<u8> },
}

impl ClipContent {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { text: value.into() }
    }

    pub fn image(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Image {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            Self::Text { .. } => TEXT_CONTENT_TYPE,
            Self::Image { mime, .. } => mime,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Text { text } => text.as_bytes(),
            Self::Image { bytes, .. } => bytes,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes().len()
    }

    /// One-line label: the text itself, or `[image/png 1.2 KB]`.
    pub fn summary(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Image { mime, bytes } => format!("[{mime} {}]", human_size(bytes.len())),
        }
    }

    fn from_row(content_type: String, bytes: Vec<u8>) -> Result<Self, StoreError> {
        if content_type == TEXT_CONTENT_TYPE {
            let text = String::from_utf8(bytes)
                .map_err(|_| StoreError::ContentType("text with invalid utf-8".to_string()))?;
            return Ok(Self::text(text));
        }
        if content_type.starts_with("image/") {
            return Ok(Self::image(content_type, bytes));
        }
        Err(StoreError::ContentType(content_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEntry {
    pub sequence_id: u64,
    pub content: ClipContent,
    pub created_epoch_ms: i64,
}

impl ClipboardEntry {
    /// Case-insensitive substring over text content; images match on their type.
    pub fn matches(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        match &self.content {
            ClipContent::Text { text } => text.to_lowercase().contains(needle_lower),
            ClipContent::Image { mime, .. } => mime.to_lowercase().contains(needle_lower),
        }
    }
}

pub struct ClipboardStore {
    conn: Mutex<Connection>,
    /// Oldest first.
    snapshot: RwLock<VecDeque<Arc<ClipboardEntry>>>,
    capacity: usize,
}

impl ClipboardStore {
    pub fn open(path: &Path, capacity: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        Self::with_connection(conn, capacity)
    }

    pub fn open_memory(capacity: usize) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, capacity)
    }

    pub fn with_connection(conn: Connection, capacity: usize) -> Result<Self, StoreError> {
        let capacity = capacity.max(1);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS clip_entry (
                 seq INTEGER PRIMARY KEY,
                 content_type TEXT NOT NULL,
                 content BLOB NOT NULL,
                 created_epoch_ms INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS clip_meta (
                 key TEXT PRIMARY KEY,
                 value INTEGER NOT NULL
             );",
        )?;

        // A smaller capacity than last run trims on open.
        trim_to_capacity(&conn, capacity)?;
        let entries = load_entries(&conn)?;
        debug!(entries = entries.len(), capacity, "clipboard store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            snapshot: RwLock::new(entries.into_iter().map(Arc::new).collect()),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    pub fn latest(&self) -> Option<Arc<ClipboardEntry>> {
        self.snapshot.read().back().cloned()
    }

    pub fn get(&self, sequence_id: u64) -> Option<Arc<ClipboardEntry>> {
        self.snapshot
            .read()
            .iter()
            .find(|entry| entry.sequence_id == sequence_id)
            .cloned()
    }

    /// Highest sequence id ever issued, including evicted and cleared ones.
    pub fn last_sequence_id(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        read_last_seq(&conn)
    }

    /// Most recent first, filtered by a case-insensitive substring.
    pub fn query(&self, filter: &str, limit: usize) -> Vec<Arc<ClipboardEntry>> {
        let needle = filter.trim().to_lowercase();
        self.snapshot
            .read()
            .iter()
            .rev()
            .filter(|entry| entry.matches(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn append(&self, content: ClipContent) -> Result<Option<u64>, StoreError> {
        self.append_at(content, now_epoch_ms())
    }

    /// Appends unless `content` equals the most recent entry. Returns the new
    /// sequence id, or `None` for a consecutive duplicate.
    pub fn append_at(&self, content: ClipContent, epoch_ms: i64) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.lock();
        if self
            .snapshot
            .read()
            .back()
            .is_some_and(|latest| latest.content == content)
        {
            return Ok(None);
        }

        let tx = conn.transaction()?;
        let sequence_id = read_last_seq(&tx)? + 1;
        tx.execute(
            "INSERT INTO clip_meta (key, value) VALUES ('last_seq', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![sequence_id as i64],
        )?;
        tx.execute(
            "INSERT INTO clip_entry (seq, content_type, content, created_epoch_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sequence_id as i64,
                content.content_type(),
                content.bytes(),
                epoch_ms
            ],
        )?;
        let evicted = trim_to_capacity(&tx, self.capacity)?;
        tx.commit()?;

        let mut snapshot = self.snapshot.write();
        snapshot.push_back(Arc::new(ClipboardEntry {
            sequence_id,
            content,
            created_epoch_ms: epoch_ms,
        }));
        while snapshot.len() > self.capacity {
            snapshot.pop_front();
        }
        debug!(sequence_id, evicted, "clipboard entry stored");
        Ok(Some(sequence_id))
    }

    /// Removes every entry. The sequence counter is kept so ids are never reused.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM clip_entry", [])?;
        self.snapshot.write().clear();
        Ok(removed)
    }
}

fn read_last_seq(conn: &Connection) -> Result<u64, StoreError> {
    let from_meta: Option<i64> = conn
        .query_row(
            "SELECT value FROM clip_meta WHERE key = 'last_seq'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let from_rows: Option<i64> =
        conn.query_row("SELECT MAX(seq) FROM clip_entry", [], |row| row.get(0))?;
    let last = from_meta.unwrap_or(0).max(from_rows.unwrap_or(0));
    Ok(u64::try_from(last).unwrap_or(0))
}

fn trim_to_capacity(conn: &Connection, capacity: usize) -> Result<usize, StoreError> {
    let removed = conn.execute(
        "DELETE FROM clip_entry WHERE seq NOT IN
             (SELECT seq FROM clip_entry ORDER BY seq DESC LIMIT ?1)",
        params![capacity as i64],
    )?;
    Ok(removed)
}

fn load_entries(conn: &Connection) -> Result<Vec<ClipboardEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT seq, content_type, content, created_epoch_ms FROM clip_entry ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Vec<u8>>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (seq, content_type, bytes, created_epoch_ms) = row?;
        match ClipContent::from_row(content_type, bytes) {
            Ok(content) => entries.push(ClipboardEntry {
                sequence_id: u64::try_from(seq).unwrap_or(0),
                content,
                created_epoch_ms,
            }),
            Err(error) => debug!(seq, %error, "skipping unreadable clipboard row"),
        }
    }
    Ok(entries)
}

pub fn human_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < KB * KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{:.1} MB", value / (KB * KB))
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
