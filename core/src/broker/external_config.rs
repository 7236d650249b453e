//! External-configuration broker: the inverse direction of the
//! external-file broker. The core issues `external_configuration_request`
//! and the client replies; correlation reuses the server skeleton's own
//! outstanding-request map, since this is a plain outbound JSON-RPC
//! request/response pair rather than a custom envelope.

use crate::error::RpcError;
use crate::jsonrpc::RequestId;
use crate::server::Server;
use serde_json::Value;
use std::sync::Arc;

pub const REQUEST_METHOD: &str = "external_configuration_request";

pub struct ExternalConfigBroker {
    server: Arc<Server>,
}

impl ExternalConfigBroker {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    pub fn request_configuration(
        &self,
        params: Value,
        on_reply: impl Fn(&Server, Value) + Send + Sync + 'static,
        on_error: impl Fn(&Server, RpcError) + Send + Sync + 'static,
    ) -> RequestId {
        self.server.request(REQUEST_METHOD, params, on_reply, on_error)
    }
}

/// The well-known error the client is expected to reply with when it has
/// no configuration to offer.
pub fn not_found_error() -> RpcError {
    RpcError::new(0, "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullLogSink;
    use crate::server::{Dialect, LspResponseProvider, NullTelemetrySink};
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn request_configuration_writes_a_standard_request() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent2 = sent.clone();
        let provider = Arc::new(LspResponseProvider::new(Arc::new(move |v| sent2.lock().push(v))));
        let server = Server::new(
            "lsp",
            Dialect::Lsp,
            provider,
            Arc::new(NullTelemetrySink),
            Arc::new(NullLogSink),
        );
        let broker = ExternalConfigBroker::new(server);
        broker.request_configuration(json!({"section": "hlasm"}), |_, _| {}, |_, _| {});
        let sent = sent.lock();
        assert_eq!(sent[0]["method"], REQUEST_METHOD);
        assert_eq!(sent[0]["params"]["section"], "hlasm");
    }
}
