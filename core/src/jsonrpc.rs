//! JSON-RPC 2.0 message shapes shared by the LSP and DAP-tunnel dialects.

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request/response correlation id. LSP allows string or number; DAP uses
/// a plain integer `seq` instead, translated to `RequestId::Number` at the
/// tunnel boundary (see `dap::envelope`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Marker type that (de)serializes as the literal string `"2.0"`, so callers
/// never have to spell the version out by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s != "2.0" {
            return Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )));
        }
        Ok(JsonRpcVersion)
    }
}

/// A decoded inbound message: one of the three JSON-RPC shapes. Distinguished
/// by presence of `id` (request vs. notification) and of `method` vs.
/// `result`/`error` (request vs. response).
#[derive(Debug, Clone)]
pub enum Message {
    Request(RpcRequest),
    Notification(RpcNotification),
    Response(RpcResponse),
}

impl Message {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();
        if has_method && has_id {
            Ok(Message::Request(serde_json::from_value(value)?))
        } else if has_method {
            Ok(Message::Notification(serde_json::from_value(value)?))
        } else {
            Ok(Message::Response(serde_json::from_value(value)?))
        }
    }

    pub fn into_value(self) -> Result<Value, serde_json::Error> {
        match self {
            Message::Request(r) => serde_json::to_value(r),
            Message::Notification(n) => serde_json::to_value(n),
            Message::Response(r) => serde_json::to_value(r),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn distinguishes_request_from_notification_from_response() {
        let req = Message::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}
        }))
        .unwrap();
        assert!(matches!(req, Message::Request(_)));

        let notif = Message::from_value(json!({
            "jsonrpc": "2.0", "method": "textDocument/didOpen", "params": {}
        }))
        .unwrap();
        assert!(matches!(notif, Message::Notification(_)));

        let resp = Message::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "result": {}
        }))
        .unwrap();
        assert!(matches!(resp, Message::Response(_)));
    }

    #[test]
    fn request_id_roundtrips_number_and_string() {
        let n: RequestId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(n, RequestId::Number(42));
        let s: RequestId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, RequestId::String("abc".into()));
    }
}
