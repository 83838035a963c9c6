use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::backend::{BackendError, ClipboardBackend};
use super::protocol::{
    handle_json, ClearResponse, ClipboardRequest, ClipboardResponse, EntryDto, PingResponse,
    QueryResponse, RestoreResponse,
};
use super::store::{ClipContent, ClipboardStore, StoreError};
use crate::config::Config;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

static SIGNALLED: AtomicBool = AtomicBool::new(false);
/// Write end of the running daemon's wake pair, or -1. Read by the signal handler.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Watching,
    Capturing,
    Stopped,
}

impl DaemonState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Watching,
            2 => Self::Capturing,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Watching => 1,
            Self::Capturing => 2,
            Self::Stopped => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Watching => "watching",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("clipboard error: {0}")]
    Backend(#[from] BackendError),
    #[error("no clipboard entry with sequence id {0}")]
    NotFound(u64),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("cannot bind '{path}': {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("a daemon is already listening on '{0}'")]
    AlreadyRunning(PathBuf),
    #[error("cannot open clipboard history: {0}")]
    Store(#[from] StoreError),
    #[error("cannot install signal handlers: {0}")]
    Signal(String),
    #[error("accept loop failed: {0}")]
    Poll(Errno),
}

/// Everything a request or a capture touches. Shared by the accept loop,
/// connection threads and the watcher.
pub struct ClipboardService {
    store: Arc<ClipboardStore>,
    backend: Arc<dyn ClipboardBackend>,
    ignore_patterns: Vec<String>,
    state: AtomicU8,
    shutdown: AtomicBool,
    waker: Mutex<Option<UnixStream>>,
}

impl ClipboardService {
    pub fn new(
        store: Arc<ClipboardStore>,
        backend: Arc<dyn ClipboardBackend>,
        ignore_patterns: Vec<String>,
    ) -> Self {
        Self {
            store,
            backend,
            ignore_patterns,
            state: AtomicU8::new(DaemonState::Idle.as_u8()),
            shutdown: AtomicBool::new(false),
            waker: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ClipboardStore> {
        &self.store
    }

    pub fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DaemonState) {
        if self.state() == DaemonState::Stopped {
            return;
        }
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Flags shutdown and wakes the accept loop if one is waiting.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(waker) = self.waker.lock().as_ref() {
            let mut waker = waker;
            let _ = waker.write(&[1]);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) || SIGNALLED.load(Ordering::Acquire)
    }

    /// Reads the clipboard once and stores it when it is new.
    pub fn capture(&self) -> Result<Option<u64>, ServiceError> {
        self.set_state(DaemonState::Capturing);
        let result = self.capture_inner();
        self.set_state(DaemonState::Watching);
        result
    }

    fn capture_inner(&self) -> Result<Option<u64>, ServiceError> {
        let Some(content) = self.backend.read()? else {
            return Ok(None);
        };
        if !should_capture(&content, &self.ignore_patterns) {
            return Ok(None);
        }
        let stored = self.store.append(content)?;
        if let Some(sequence_id) = stored {
            debug!(sequence_id, "captured clipboard change");
        }
        Ok(stored)
    }

    pub fn handle_command(&self, request: ClipboardRequest) -> Result<ClipboardResponse, ServiceError> {
        match request {
            ClipboardRequest::Ping => Ok(ClipboardResponse::Ping(PingResponse {
                entries: self.store.len(),
                capacity: self.store.capacity(),
                last_sequence_id: self.store.last_sequence_id()?,
                state: self.state().label().to_string(),
            })),
            ClipboardRequest::Query(query) => {
                let capacity = self.store.capacity();
                let limit = query.limit.unwrap_or(capacity).min(capacity);
                let entries = self
                    .store
                    .query(&query.filter, limit)
                    .iter()
                    .map(|entry| EntryDto::from(entry.as_ref()))
                    .collect();
                Ok(ClipboardResponse::Query(QueryResponse { entries }))
            }
            ClipboardRequest::Restore(restore) => {
                if restore.sequence_id == 0 {
                    return Err(ServiceError::InvalidRequest(
                        "sequence_id must be positive".to_string(),
                    ));
                }
                let entry = self
                    .store
                    .get(restore.sequence_id)
                    .ok_or(ServiceError::NotFound(restore.sequence_id))?;
                self.backend.write(&entry.content)?;
                Ok(ClipboardResponse::Restore(RestoreResponse {
                    sequence_id: entry.sequence_id,
                }))
            }
            ClipboardRequest::Clear => {
                let removed = self.store.clear()?;
                info!(removed, "clipboard history cleared");
                Ok(ClipboardResponse::Clear(ClearResponse { removed }))
            }
            ClipboardRequest::Shutdown => {
                info!("shutdown requested over ipc");
                self.request_shutdown();
                Ok(ClipboardResponse::Shutdown)
            }
        }
    }
}

/// Skips empty text and text containing any ignore pattern (case-insensitive).
pub fn should_capture(content: &ClipContent, ignore_patterns: &[String]) -> bool {
    match content {
        ClipContent::Text { text } => {
            !text.trim().is_empty() && !is_sensitive_content(text, ignore_patterns)
        }
        ClipContent::Image { bytes, .. } => !bytes.is_empty(),
    }
}

fn is_sensitive_content(value: &str, patterns: &[String]) -> bool {
    let lowered = value.to_lowercase();
    patterns.iter().any(|pattern| {
        let p = pattern.trim().to_lowercase();
        !p.is_empty() && lowered.contains(&p)
    })
}

pub struct Daemon {
    service: Arc<ClipboardService>,
    backend: Arc<dyn ClipboardBackend>,
    socket_path: PathBuf,
    poll_interval: Duration,
    watcher: Arc<Mutex<Option<Child>>>,
}

impl Daemon {
    pub fn from_config(config: &Config, backend: Arc<dyn ClipboardBackend>) -> Result<Self, DaemonError> {
        let store = Arc::new(ClipboardStore::open(
            &config.clipboard_db_path(),
            config.clipboard.max_entries,
        )?);
        let service = Arc::new(ClipboardService::new(
            store,
            Arc::clone(&backend),
            config.clipboard.ignore_patterns.clone(),
        ));
        Ok(Self::new(
            service,
            backend,
            config.socket_path(),
            Duration::from_millis(config.clipboard.poll_interval_ms),
        ))
    }

    pub fn new(
        service: Arc<ClipboardService>,
        backend: Arc<dyn ClipboardBackend>,
        socket_path: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            backend,
            socket_path,
            poll_interval,
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn service(&self) -> &Arc<ClipboardService> {
        &self.service
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Binds the socket, replacing a stale file left by a crashed daemon.
    pub fn bind(&self) -> Result<UnixListener, DaemonError> {
        let path = &self.socket_path;
        if path.exists() {
            if UnixStream::connect(path).is_ok() {
                return Err(DaemonError::AlreadyRunning(path.clone()));
            }
            debug!(path = %path.display(), "removing stale socket");
            let _ = std::fs::remove_file(path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DaemonError::Bind {
                path: path.clone(),
                source,
            })?;
        }
        let listener = UnixListener::bind(path).map_err(|source| DaemonError::Bind {
            path: path.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| DaemonError::Bind {
                path: path.clone(),
                source,
            })?;
        Ok(listener)
    }

    /// Socket pair whose read end joins the accept poll. Shutdown requests
    /// and signals write one byte to the other end.
    fn install_waker(&self) -> Result<UnixStream, DaemonError> {
        let bind_error = |source| DaemonError::Bind {
            path: self.socket_path.clone(),
            source,
        };
        let (wake_rx, wake_tx) = UnixStream::pair().map_err(bind_error)?;
        wake_rx.set_nonblocking(true).map_err(bind_error)?;
        wake_tx.set_nonblocking(true).map_err(bind_error)?;
        WAKE_FD.store(wake_tx.as_raw_fd(), Ordering::Release);
        *self.service.waker.lock() = Some(wake_tx);
        Ok(wake_rx)
    }

    /// Idle -> Watching until a signal or a `shutdown` request, then Stopped.
    pub fn run(self) -> Result<(), DaemonError> {
        let listener = self.bind()?;
        let wake = self.install_waker()?;
        info!(socket = %self.socket_path.display(), "clipboard daemon listening");

        if let Err(error) = self.service.capture() {
            warn!(%error, "initial clipboard capture failed");
        }
        self.service.set_state(DaemonState::Watching);
        self.spawn_watcher();

        let mut outcome = Ok(());
        while !self.service.is_shutting_down() {
            match wait_for_activity(&listener, &wake) {
                Ok(Activity::Connection) => self.accept(&listener),
                Ok(Activity::Wake) => drain(&wake),
                Err(Errno::EINTR) => {}
                Err(errno) => {
                    error!(%errno, "poll on clipboard socket failed");
                    outcome = Err(DaemonError::Poll(errno));
                    break;
                }
            }
        }

        self.stop();
        outcome
    }

    fn accept(&self, listener: &UnixListener) {
        match listener.accept() {
            Ok((stream, _)) => {
                let service = Arc::clone(&self.service);
                let spawned = thread::Builder::new()
                    .name("clipboard-conn".to_string())
                    .spawn(move || handle_connection(&service, stream));
                if let Err(error) = spawned {
                    warn!(%error, "failed to spawn connection handler");
                }
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => {}
            Err(error) => warn!(%error, "accept failed"),
        }
    }

    fn stop(&self) {
        self.service.request_shutdown();
        self.service.state.store(DaemonState::Stopped.as_u8(), Ordering::Release);
        if let Some(waker) = self.service.waker.lock().take() {
            let _ = WAKE_FD.compare_exchange(
                waker.as_raw_fd(),
                -1,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        if let Some(mut child) = self.watcher.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Err(error) = std::fs::remove_file(&self.socket_path) {
            if error.kind() != ErrorKind::NotFound {
                warn!(%error, "failed to remove socket");
            }
        }
        info!("clipboard daemon stopped");
    }

    fn spawn_watcher(&self) {
        let service = Arc::clone(&self.service);
        let backend = Arc::clone(&self.backend);
        let watcher = Arc::clone(&self.watcher);
        let poll_interval = self.poll_interval;
        let spawned = thread::Builder::new()
            .name("clipboard-watch".to_string())
            .spawn(move || {
                if !watch_notifications(&service, backend.as_ref(), &watcher) {
                    poll_loop(&service, poll_interval);
                }
            });
        if let Err(error) = spawned {
            error!(%error, "failed to spawn clipboard watcher");
        }
    }
}

enum Activity {
    Connection,
    Wake,
}

/// Blocks until a client connects or the waker fires.
fn wait_for_activity(listener: &UnixListener, wake: &UnixStream) -> Result<Activity, Errno> {
    let mut fds = [
        PollFd::new(wake.as_fd(), PollFlags::POLLIN),
        PollFd::new(listener.as_fd(), PollFlags::POLLIN),
    ];
    poll(&mut fds, PollTimeout::NONE)?;
    let ready = |fd: &PollFd| {
        fd.revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR))
    };
    if ready(&fds[0]) {
        Ok(Activity::Wake)
    } else if ready(&fds[1]) {
        Ok(Activity::Connection)
    } else {
        Err(Errno::EINTR)
    }
}

fn drain(mut wake: &UnixStream) {
    let mut buffer = [0u8; 64];
    while matches!(wake.read(&mut buffer), Ok(n) if n > 0) {}
}

/// Captures once per line printed by the backend's watch command. Returns
/// false when no such command exists or it died, so the caller falls back
/// to polling.
fn watch_notifications(
    service: &ClipboardService,
    backend: &dyn ClipboardBackend,
    slot: &Mutex<Option<Child>>,
) -> bool {
    let Some(mut command) = backend.watch_command() else {
        return false;
    };
    let mut child = match command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(error) => {
            warn!(%error, "clipboard watch command failed to start; polling instead");
            return false;
        }
    };
    let Some(stdout) = child.stdout.take() else {
        return false;
    };
    *slot.lock() = Some(child);
    info!("watching clipboard change notifications");

    for line in BufReader::new(stdout).lines() {
        if service.is_shutting_down() {
            return true;
        }
        if line.is_err() {
            break;
        }
        if let Err(error) = service.capture() {
            warn!(%error, "clipboard capture failed");
        }
    }

    if service.is_shutting_down() {
        return true;
    }
    warn!("clipboard watch command exited; polling instead");
    false
}

fn poll_loop(service: &ClipboardService, interval: Duration) {
    info!(interval_ms = interval.as_millis() as u64, "polling clipboard");
    while !service.is_shutting_down() {
        if let Err(error) = service.capture() {
            debug!(%error, "clipboard poll failed");
        }
        thread::sleep(interval);
    }
}

fn handle_connection(service: &ClipboardService, stream: UnixStream) {
    // Accepted sockets inherit non-blocking mode on some platforms.
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(CONNECTION_TIMEOUT));
    let _ = stream.set_write_timeout(Some(CONNECTION_TIMEOUT));

    let mut reader = BufReader::new(&stream);
    let mut line = String::new();
    if let Err(error) = reader.read_line(&mut line) {
        debug!(%error, "failed to read request");
        return;
    }
    let mut response = handle_json(service, line.trim_end());
    response.push('\n');
    let mut writer = &stream;
    if let Err(error) = writer.write_all(response.as_bytes()) {
        debug!(%error, "failed to write response");
    }
}

extern "C" fn on_terminate(_signal: nix::libc::c_int) {
    SIGNALLED.store(true, Ordering::Release);
    let fd = WAKE_FD.load(Ordering::Acquire);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe and the buffer outlives the call.
        unsafe {
            nix::libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

/// Routes SIGINT and SIGTERM into the accept loop's shutdown check and
/// wakes the loop.
pub fn install_signal_handlers() -> Result<(), DaemonError> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(signal, &action) }.map_err(|e| DaemonError::Signal(e.to_string()))?;
    }
    Ok(())
}
