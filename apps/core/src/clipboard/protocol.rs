//! Launcher <-> daemon wire contract: one newline-terminated JSON request per
//! connection, answered by one newline-terminated JSON envelope.

use serde::{Deserialize, Serialize};

use super::daemon::{ClipboardService, ServiceError};
use super::store::{ClipContent, ClipboardEntry};
use crate::model::preview_text;

pub const PROTOCOL_VERSION: u32 = 1;
const PREVIEW_CHARS: usize = 120;
const KNOWN_KINDS: &[&str] = &["ping", "query", "restore", "clear", "shutdown"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreRequest {
    pub sequence_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ClipboardRequest {
    Ping,
    Query(QueryRequest),
    Restore(RestoreRequest),
    Clear,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryDto {
    pub sequence_id: u64,
    pub content_type: String,
    /// Full text for text entries; absent for binary content.
    #[serde(default)]
    pub text: Option<String>,
    pub preview: String,
    pub byte_len: usize,
    pub created_epoch_ms: i64,
}

impl From<&ClipboardEntry> for EntryDto {
    fn from(entry: &ClipboardEntry) -> Self {
        Self {
            sequence_id: entry.sequence_id,
            content_type: entry.content.content_type().to_string(),
            text: entry.content.as_text().map(str::to_string),
            preview: preview_text(&entry.content.summary(), PREVIEW_CHARS),
            byte_len: entry.content.byte_len(),
            created_epoch_ms: entry.created_epoch_ms,
        }
    }
}

impl EntryDto {
    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn to_content(&self) -> Option<ClipContent> {
        self.text.clone().map(ClipContent::text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingResponse {
    pub entries: usize,
    pub capacity: usize,
    pub last_sequence_id: u64,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub entries: Vec<EntryDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreResponse {
    pub sequence_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ClipboardResponse {
    Ping(PingResponse),
    Query(QueryResponse),
    Restore(RestoreResponse),
    Clear(ClearResponse),
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidJson,
    InvalidRequest,
    Unsupported,
    Store,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransportResponse {
    Ok {
        #[serde(default)]
        protocol_version: u32,
        response: ClipboardResponse,
    },
    Err {
        error: ErrorResponse,
    },
}

impl TransportResponse {
    fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Err {
            error: ErrorResponse {
                code,
                message: message.into(),
            },
        }
    }
}

pub fn handle_request(service: &ClipboardService, request: ClipboardRequest) -> TransportResponse {
    match service.handle_command(request) {
        Ok(response) => TransportResponse::Ok {
            protocol_version: PROTOCOL_VERSION,
            response,
        },
        Err(error) => TransportResponse::Err {
            error: map_service_error(error),
        },
    }
}

pub fn handle_json(service: &ClipboardService, payload: &str) -> String {
    let response = match parse_request(payload) {
        Ok(request) => handle_request(service, request),
        Err(response) => response,
    };
    encode(&response)
}

pub fn encode(response: &TransportResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|error| {
        format!(
            "{{\"status\":\"err\",\"error\":{{\"code\":\"store\",\"message\":\"encode failed: {}\"}}}}",
            error.to_string().replace('"', "'")
        )
    })
}

fn parse_request(payload: &str) -> Result<ClipboardRequest, TransportResponse> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| TransportResponse::error(ErrorCode::InvalidJson, e.to_string()))?;

    let kind = value
        .get("kind")
        .and_then(|kind| kind.as_str())
        .ok_or_else(|| TransportResponse::error(ErrorCode::InvalidRequest, "missing 'kind'"))?;
    if !KNOWN_KINDS.contains(&kind) {
        return Err(TransportResponse::error(
            ErrorCode::Unsupported,
            format!("unsupported request kind '{kind}'"),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| TransportResponse::error(ErrorCode::InvalidRequest, e.to_string()))
}

fn map_service_error(error: ServiceError) -> ErrorResponse {
    let code = match &error {
        ServiceError::Store(_) | ServiceError::Backend(_) => ErrorCode::Store,
        ServiceError::NotFound(_) => ErrorCode::NotFound,
        ServiceError::InvalidRequest(_) => ErrorCode::InvalidRequest,
    };
    ErrorResponse {
        code,
        message: error.to_string(),
    }
}
