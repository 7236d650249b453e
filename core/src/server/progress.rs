//! LSP work-done-progress token lifecycle.

use super::Server;
use crate::error::RpcError;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Weak;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Invalid,
    Valid,
    /// A `window/workDoneProgress/create` request is in flight.
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Begin,
    Report,
    End,
}

impl ProgressKind {
    fn as_str(self) -> &'static str {
        match self {
            ProgressKind::Begin => "begin",
            ProgressKind::Report => "report",
            ProgressKind::End => "end",
        }
    }
}

/// Owns the single rotating parsing-progress token. Holds a
/// `Weak` handle back to the owning server so it can issue the
/// `workDoneProgress/create` request and progress notifications without an
/// ownership cycle.
pub struct ProgressTracker {
    server: Weak<Server>,
    state: Mutex<ProgressState>,
    token: Mutex<Option<i64>>,
    pending_uri: Mutex<Option<String>>,
    next_token: AtomicI64,
}

impl ProgressTracker {
    pub fn new(server: Weak<Server>) -> Self {
        Self {
            server,
            state: Mutex::new(ProgressState::Invalid),
            token: Mutex::new(None),
            pending_uri: Mutex::new(None),
            next_token: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> ProgressState {
        *self.state.lock()
    }

    /// `parsing_started("")` signals completion; any other `uri` signals a
    /// parse beginning or continuing.
    pub fn parsing_started(&self, uri: &str) {
        let Some(server) = self.server.upgrade() else {
            return;
        };

        let mut state = self.state.lock();
        match *state {
            ProgressState::Invalid => {
                if uri.is_empty() {
                    // End without a matching begin: dropped.
                    return;
                }
                let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
                *self.token.lock() = Some(token);
                *self.pending_uri.lock() = Some(uri.to_string());
                *state = ProgressState::Requested;
                drop(state);
                self.request_create(&server, token);
            }
            ProgressState::Requested => {
                // A create is already in flight; duplicate begins are
                // suppressed until it resolves.
            }
            ProgressState::Valid => {
                let token = self.token.lock().expect("valid state always has a token");
                if uri.is_empty() {
                    server.response_provider().notify(
                        "$/progress",
                        json!({"token": token, "value": {"kind": ProgressKind::End.as_str()}}),
                    );
                    *state = ProgressState::Invalid;
                    *self.token.lock() = None;
                } else {
                    server.response_provider().notify(
                        "$/progress",
                        json!({"token": token, "value": {"kind": ProgressKind::Report.as_str(), "message": uri}}),
                    );
                }
            }
        }
    }

    fn request_create(&self, server: &Server, token: i64) {
        server.request(
            "window/workDoneProgress/create",
            json!({"token": token}),
            move |server, _result| {
                server.progress().on_create_result(server, true);
            },
            move |server, _error: RpcError| {
                server.progress().on_create_result(server, false);
            },
        );
    }

    fn on_create_result(&self, server: &Server, success: bool) {
        let mut state = self.state.lock();
        if *state != ProgressState::Requested {
            return;
        }
        if success {
            if let Some(uri) = self.pending_uri.lock().take() {
                *state = ProgressState::Valid;
                let token = *self.token.lock();
                drop(state);
                server.response_provider().notify(
                    "$/progress",
                    json!({
                        "token": token,
                        "value": {"kind": ProgressKind::Begin.as_str(), "title": "Parsing", "message": uri},
                    }),
                );
            }
        } else {
            *state = ProgressState::Invalid;
            *self.token.lock() = None;
            *self.pending_uri.lock() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullLogSink;
    use crate::request_manager::{CancelToken, MessageSink};
    use crate::server::response_provider::LspResponseProvider;
    use crate::server::telemetry::NullTelemetrySink;
    use crate::server::Dialect;
    use parking_lot::Mutex as PMutex;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn recording_sink() -> (Arc<dyn Fn(Value) + Send + Sync>, Arc<PMutex<Vec<Value>>>) {
        let out = Arc::new(PMutex::new(Vec::new()));
        let out2 = out.clone();
        (Arc::new(move |v: Value| out2.lock().push(v)), out)
    }

    fn token() -> CancelToken {
        CancelToken::from_flag(Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn full_lifecycle_invalid_requested_valid_report_end() {
        let (sink, out) = recording_sink();
        let provider = Arc::new(LspResponseProvider::new(sink));
        let server = Server::new("lsp", Dialect::Lsp, provider, Arc::new(NullTelemetrySink), Arc::new(NullLogSink));

        assert_eq!(server.progress().state(), ProgressState::Invalid);

        server.progress().parsing_started("file:///a.hlasm");
        assert_eq!(server.progress().state(), ProgressState::Requested);
        {
            let sent = out.lock();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0]["method"], "window/workDoneProgress/create");
        }

        // Client replies to the create request; this resolves Requested -> Valid
        // and emits the "begin" progress notification.
        server.message_received(json!({"jsonrpc": "2.0", "id": 1, "result": {}}), token());
        assert_eq!(server.progress().state(), ProgressState::Valid);
        {
            let sent = out.lock();
            assert_eq!(sent.len(), 2);
            assert_eq!(sent[1]["method"], "$/progress");
            assert_eq!(sent[1]["params"]["value"]["kind"], "begin");
            assert_eq!(sent[1]["params"]["value"]["message"], "file:///a.hlasm");
        }

        server.progress().parsing_started("file:///a.hlasm");
        assert_eq!(server.progress().state(), ProgressState::Valid);
        {
            let sent = out.lock();
            assert_eq!(sent.len(), 3);
            assert_eq!(sent[2]["params"]["value"]["kind"], "report");
        }

        server.progress().parsing_started("");
        assert_eq!(server.progress().state(), ProgressState::Invalid);
        let sent = out.lock();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[3]["params"]["value"]["kind"], "end");
    }

    #[test]
    fn failed_create_request_resets_to_invalid() {
        let (sink, _out) = recording_sink();
        let provider = Arc::new(LspResponseProvider::new(sink));
        let server = Server::new("lsp", Dialect::Lsp, provider, Arc::new(NullTelemetrySink), Arc::new(NullLogSink));

        server.progress().parsing_started("file:///a.hlasm");
        assert_eq!(server.progress().state(), ProgressState::Requested);

        server.message_received(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "nope"}}),
            token(),
        );
        assert_eq!(server.progress().state(), ProgressState::Invalid);
    }
}
