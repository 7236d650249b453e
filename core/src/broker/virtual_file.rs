//! Virtual-file provider: a router-installed sink that synthesizes a
//! reply locally, answering the parser backend's virtual-file queries on
//! the client's behalf.

use crate::error::RpcError;
use crate::jsonrpc::{RequestId, RpcResponse};
use crate::log::SharedLogSink;
use crate::router::Predicate;
use serde_json::{json, Value};
use std::sync::Arc;

pub const METHOD: &str = "get_file_content";

/// The workspace-manager seam this sink queries. Out of scope to
/// implement; fixed interface only.
pub trait VirtualFileProvider: Send + Sync {
    fn file_content(&self, id: u64) -> Option<String>;
}

pub struct VirtualFileSink {
    provider: Arc<dyn VirtualFileProvider>,
    outbound: Arc<dyn Fn(Value) + Send + Sync>,
    log: SharedLogSink,
}

impl VirtualFileSink {
    pub fn new(
        provider: Arc<dyn VirtualFileProvider>,
        outbound: Arc<dyn Fn(Value) + Send + Sync>,
        log: SharedLogSink,
    ) -> Self {
        Self { provider, outbound, log }
    }

    pub fn handle(&self, message: Value) {
        let Some(id) = message
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value::<RequestId>(v).ok())
        else {
            self.log.warn("virtual_file", "get_file_content missing id");
            return;
        };

        let file_id = message.get("params").and_then(|p| p.get("id")).and_then(Value::as_u64);
        let content = file_id.and_then(|file_id| self.provider.file_content(file_id));

        let response = match content {
            Some(content) if !content.is_empty() => {
                RpcResponse::success(id, json!({ "content": content }))
            }
            _ => RpcResponse::failure(id, RpcError::new(1, "File not found")),
        };
        (self.outbound)(serde_json::to_value(response).expect("RpcResponse always serializes"));
    }
}

pub fn predicate() -> Predicate {
    crate::router::method_is(METHOD)
}
