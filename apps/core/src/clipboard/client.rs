use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::protocol::{
    ClipboardRequest, ClipboardResponse, EntryDto, ErrorResponse, PingResponse, QueryRequest,
    RestoreRequest, TransportResponse,
};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connect, timeout or framing failure. The launcher treats it as "no daemon".
    #[error("clipboard daemon unavailable: {0}")]
    DaemonUnavailable(String),
    #[error("daemon rejected request: {code:?}: {message}", code = .0.code, message = .0.message)]
    Rejected(ErrorResponse),
    #[error("unexpected response kind")]
    UnexpectedResponse,
}

#[derive(Debug, Clone)]
pub struct ClipboardClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ClipboardClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn ping(&self) -> Result<PingResponse, ClientError> {
        match self.send(&ClipboardRequest::Ping)? {
            ClipboardResponse::Ping(ping) => Ok(ping),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn query(&self, filter: &str, limit: Option<usize>) -> Result<Vec<EntryDto>, ClientError> {
        let request = ClipboardRequest::Query(QueryRequest {
            filter: filter.to_string(),
            limit,
        });
        match self.send(&request)? {
            ClipboardResponse::Query(query) => Ok(query.entries),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn restore(&self, sequence_id: u64) -> Result<(), ClientError> {
        match self.send(&ClipboardRequest::Restore(RestoreRequest { sequence_id }))? {
            ClipboardResponse::Restore(_) => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn clear(&self) -> Result<usize, ClientError> {
        match self.send(&ClipboardRequest::Clear)? {
            ClipboardResponse::Clear(clear) => Ok(clear.removed),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(&ClipboardRequest::Shutdown)? {
            ClipboardResponse::Shutdown => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// One request per connection, bounded by the read/write timeout.
    pub fn send(&self, request: &ClipboardRequest) -> Result<ClipboardResponse, ClientError> {
        let unavailable = |e: &dyn std::fmt::Display| ClientError::DaemonUnavailable(e.to_string());

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| unavailable(&e))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| unavailable(&e))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| unavailable(&e))?;

        let mut line = serde_json::to_string(request).map_err(|e| unavailable(&e))?;
        line.push('\n');
        let mut writer = &stream;
        writer.write_all(line.as_bytes()).map_err(|e| unavailable(&e))?;

        let mut reply = String::new();
        BufReader::new(&stream)
            .read_line(&mut reply)
            .map_err(|e| unavailable(&e))?;
        if reply.trim().is_empty() {
            return Err(ClientError::DaemonUnavailable("empty reply".to_string()));
        }

        match serde_json::from_str::<TransportResponse>(reply.trim_end()) {
            Ok(TransportResponse::Ok { response, .. }) => Ok(response),
            Ok(TransportResponse::Err { error }) => Err(ClientError::Rejected(error)),
            Err(error) => Err(unavailable(&error)),
        }
    }
}
