//! Two `ResponseProvider` implementations, one per wire dialect, behind the
//! one capability feature modules bind against.

use crate::error::RpcError;
use crate::jsonrpc::{JsonRpcVersion, RequestId, RpcNotification, RpcRequest, RpcResponse};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Where a response provider ultimately writes its framed JSON. Usually
/// the main channel's `write`, or (for a DAP session) the tunnel-envelope
/// wrapper that rewraps before forwarding to the main channel.
pub type OutboundSink = Arc<dyn Fn(Value) + Send + Sync>;

/// The one capability both dialects' feature handlers bind against:
/// `respond`, `notify`, `respond_error`, plus outbound `request`.
pub trait ResponseProvider: Send + Sync {
    fn respond(&self, id: RequestId, method: &str, result: Value);
    fn respond_error(&self, id: RequestId, method: &str, error: RpcError);
    fn notify(&self, method: &str, params: Value);
    /// Allocates a fresh outbound id, writes the request, and returns the
    /// id so the caller can correlate the eventual response.
    fn request(&self, method: &str, params: Value) -> RequestId;
}

pub struct LspResponseProvider {
    sink: OutboundSink,
    next_id: AtomicI64,
}

impl LspResponseProvider {
    pub fn new(sink: OutboundSink) -> Self {
        Self {
            sink,
            next_id: AtomicI64::new(0),
        }
    }
}

impl ResponseProvider for LspResponseProvider {
    fn respond(&self, id: RequestId, _method: &str, result: Value) {
        let response = RpcResponse::success(id, result);
        (self.sink)(serde_json::to_value(response).expect("RpcResponse always serializes"));
    }

    fn respond_error(&self, id: RequestId, _method: &str, error: RpcError) {
        let response = RpcResponse::failure(id, error);
        (self.sink)(serde_json::to_value(response).expect("RpcResponse always serializes"));
    }

    fn notify(&self, method: &str, params: Value) {
        let notification = RpcNotification {
            jsonrpc: JsonRpcVersion,
            method: method.to_string(),
            params: Some(params),
        };
        (self.sink)(serde_json::to_value(notification).expect("RpcNotification always serializes"));
    }

    fn request(&self, method: &str, params: Value) -> RequestId {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let request = RpcRequest {
            jsonrpc: JsonRpcVersion,
            id: id.clone(),
            method: method.to_string(),
            params: Some(params),
        };
        (self.sink)(serde_json::to_value(request).expect("RpcRequest always serializes"));
        id
    }
}

/// Wraps the outbound side of an embedded DAP server: builds
/// `{seq, type, ...}` envelopes and tracks `seq` monotonically.
pub struct DapResponseProvider {
    sink: OutboundSink,
    next_seq: AtomicI64,
}

impl DapResponseProvider {
    pub fn new(sink: OutboundSink) -> Self {
        Self {
            sink,
            next_seq: AtomicI64::new(0),
        }
    }

    fn next_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn request_seq_of(id: &RequestId) -> i64 {
        match id {
            RequestId::Number(n) => *n,
            RequestId::String(s) => s.parse().unwrap_or(0),
        }
    }
}

impl ResponseProvider for DapResponseProvider {
    fn respond(&self, id: RequestId, method: &str, result: Value) {
        let envelope = json!({
            "seq": self.next_seq(),
            "type": "response",
            "request_seq": Self::request_seq_of(&id),
            "success": true,
            "command": method,
            "body": result,
        });
        (self.sink)(envelope);
    }

    fn respond_error(&self, id: RequestId, method: &str, error: RpcError) {
        let envelope = json!({
            "seq": self.next_seq(),
            "type": "response",
            "request_seq": Self::request_seq_of(&id),
            "success": false,
            "command": method,
            "message": error.message,
        });
        (self.sink)(envelope);
    }

    fn notify(&self, method: &str, params: Value) {
        let envelope = json!({
            "seq": self.next_seq(),
            "type": "event",
            "event": method,
            "body": params,
        });
        (self.sink)(envelope);
    }

    fn request(&self, method: &str, params: Value) -> RequestId {
        let seq = self.next_seq();
        let envelope = json!({
            "seq": seq,
            "type": "request",
            "command": method,
            "arguments": params,
        });
        (self.sink)(envelope);
        RequestId::Number(seq)
    }
}
