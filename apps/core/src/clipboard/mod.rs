//! Clipboard history: the daemon-owned store, the system clipboard backend
//! and the socket protocol the launcher reads it through.

pub mod backend;
pub mod client;
pub mod daemon;
pub mod protocol;
pub mod store;

pub use backend::{BackendError, ClipboardBackend, CommandBackend};
pub use client::{ClientError, ClipboardClient};
pub use daemon::{ClipboardService, Daemon, DaemonError, DaemonState};
pub use store::{ClipContent, ClipboardEntry, ClipboardStore, StoreError};
