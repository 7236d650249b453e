//! Method table entries shared by the LSP and DAP flavors of the server
//! skeleton.

use super::Server;
use crate::jsonrpc::RequestId;
use crate::request_manager::CancelToken;
use serde_json::Value;

/// Whether a registered method expects a reply (request-style) or not
/// (notification-style). Both forms receive the [`CancelToken`] the
/// request manager handed the dispatcher — embedded DAP servers, which
/// bypass the request manager, pass an always-uncancelled token.
pub enum HandlerKind {
    Request(Box<dyn Fn(&Server, RequestId, Value, CancelToken) + Send + Sync>),
    Notification(Box<dyn Fn(&Server, Value, CancelToken) + Send + Sync>),
}

/// Telemetry-emission level for a method.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Telemetry {
    None,
    Timed,
}

pub struct MethodEntry {
    pub kind: HandlerKind,
    pub telemetry: Telemetry,
}

impl MethodEntry {
    pub fn request(
        telemetry: Telemetry,
        handler: impl Fn(&Server, RequestId, Value, CancelToken) + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: HandlerKind::Request(Box::new(handler)),
            telemetry,
        }
    }

    pub fn notification(
        telemetry: Telemetry,
        handler: impl Fn(&Server, Value, CancelToken) + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: HandlerKind::Notification(Box::new(handler)),
            telemetry,
        }
    }

    pub fn is_request_style(&self) -> bool {
        matches!(self.kind, HandlerKind::Request(_))
    }
}
