//! Tunnel envelope wrap/unwrap: DAP's own `seq`/`type` semantics are
//! preserved untouched inside `params`; the outer router only ever
//! inspects `method`.

use serde_json::{json, Value};

pub const REGISTRATION_METHOD: &str = "hlasm/dap_tunnel";

pub fn tunnel_method(session_id: u64) -> String {
    format!("{REGISTRATION_METHOD}/{session_id}")
}

/// Extracts the numeric session id from a tunnel method name, if it has
/// the `hlasm/dap_tunnel/<n>` shape.
pub fn session_id_of(method: &str) -> Option<u64> {
    method.strip_prefix("hlasm/dap_tunnel/")?.parse().ok()
}

/// Wraps a raw DAP message as the `params` of an LSP notification whose
/// method encodes the session id.
pub fn wrap(session_id: u64, dap_message: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": tunnel_method(session_id),
        "params": dap_message,
    })
}

/// Recovers the raw DAP message from a tunnel envelope.
pub fn unwrap(envelope: &Value) -> Option<Value> {
    envelope.get("params").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_is_identity() {
        let dap_message = json!({"type": "request", "seq": 1, "command": "initialize"});
        let envelope = wrap(3, dap_message.clone());
        assert_eq!(unwrap(&envelope), Some(dap_message));
    }

    #[test]
    fn unwrap_then_wrap_is_identity() {
        let envelope = json!({
            "jsonrpc": "2.0",
            "method": "hlasm/dap_tunnel/3",
            "params": {"type": "event", "seq": 2, "event": "initialized"},
        });
        let dap_message = unwrap(&envelope).unwrap();
        assert_eq!(wrap(3, dap_message), envelope);
    }

    #[test]
    fn session_id_parsed_from_tunnel_method() {
        assert_eq!(session_id_of("hlasm/dap_tunnel/3"), Some(3));
        assert_eq!(session_id_of("hlasm/dap_tunnel"), None);
        assert_eq!(session_id_of("textDocument/didOpen"), None);
    }
}
