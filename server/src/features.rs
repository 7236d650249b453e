//! Registers the handful of `textDocument/*` handlers the request manager
//! dispatches parse work to. Real LSP feature semantics (hover, definition,
//! completion, ...) are out of scope here — the core only guarantees each
//! registered feature is invoked from the request-manager worker with a
//! deserialized params blob and a reply capability.

use crate::workspace::WorkspaceManager;
use hlasm_ls_core::server::{MethodEntry, Server, Telemetry};
use serde_json::Value;
use std::sync::Arc;

pub fn register(server: &Arc<Server>, workspace: Arc<dyn WorkspaceManager>) {
    {
        let workspace = workspace.clone();
        server.register(
            "textDocument/didOpen",
            MethodEntry::notification(Telemetry::Timed, move |_server, params, cancel| {
                if let Some((uri, text)) = text_document_identity(&params) {
                    workspace.did_open(&uri, &text, &cancel);
                }
            }),
        );
    }
    {
        let workspace = workspace.clone();
        server.register(
            "textDocument/didChange",
            MethodEntry::notification(Telemetry::Timed, move |_server, params, cancel| {
                if let Some((uri, text)) = text_document_identity(&params) {
                    workspace.did_change(&uri, &text, &cancel);
                }
            }),
        );
    }
    {
        let workspace = workspace.clone();
        server.register(
            "textDocument/didClose",
            MethodEntry::notification(Telemetry::None, move |_server, params, _cancel| {
                if let Some(uri) = params.get("textDocument").and_then(|t| t.get("uri")).and_then(Value::as_str) {
                    workspace.did_close(uri);
                }
            }),
        );
    }
}

/// Extracts `(uri, text)` from a `didOpen`/`didChange` params blob. Real
/// `didChange` payloads carry incremental edits; this front end only needs
/// the file identity and enough text to demonstrate coalescing, so it
/// takes the last content change's full text (or `textDocument.text` for
/// `didOpen`).
fn text_document_identity(params: &Value) -> Option<(String, String)> {
    let uri = params.get("textDocument")?.get("uri")?.as_str()?.to_string();
    let text = params
        .get("textDocument")
        .and_then(|t| t.get("text"))
        .and_then(Value::as_str)
        .or_else(|| {
            params
                .get("contentChanges")?
                .as_array()?
                .last()?
                .get("text")?
                .as_str()
        })?
        .to_string();
    Some((uri, text))
}
