//! Internal error types and the JSON-RPC wire error representation.
//!
//! Internal failures are typed with `thiserror` so call sites can match on
//! them; once a failure needs to cross the wire it is converted into an
//! [`RpcError`], which is the only error shape a client ever observes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Standard JSON-RPC / LSP error codes used by this crate. Handlers are free
/// to use other codes (e.g. DAP-specific ones carried through as `data`),
/// these are the ones the core itself produces.
pub mod code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    pub const REQUEST_CANCELLED: i64 = -32800;
    pub const CONTENT_MODIFIED: i64 = -32801;
}

/// The error object carried in a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(code::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(code::INTERNAL_ERROR, message)
    }

    pub fn server_not_initialized() -> Self {
        Self::new(
            code::SERVER_NOT_INITIALIZED,
            "server has not been initialized",
        )
    }

    pub fn request_cancelled() -> Self {
        Self::new(code::REQUEST_CANCELLED, "request cancelled")
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Failures from the framed channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("message exceeds maximum size ({size} > {limit})")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("zero-length message body")]
    EmptyMessage,
    #[error("end of stream")]
    Eof,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures surfaced by the external/virtual-file and external-config
/// brokers.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker channel is shut down")]
    ShutDown,
    #[error("no thread registration for the calling thread")]
    NotRegistered,
    #[error("request timed out waiting for a response")]
    TimedOut,
    #[error("malformed broker response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Failures from dispatch/routing.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no route matched message: {0}")]
    Unrouted(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Failures from DAP session management.
#[derive(Debug, thiserror::Error)]
pub enum DapError {
    #[error("malformed tunnel envelope: {0}")]
    MalformedEnvelope(String),
    #[error("no session for tunnel method: {0}")]
    UnknownSession(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
