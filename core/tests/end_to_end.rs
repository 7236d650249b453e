//! Exercises the pieces of the crate that only show their real behavior
//! wired together: initialize/shutdown/exit over a real `Server`, parse
//! coalescing through the request manager, and DAP registration through
//! the session manager.

use dashmap::DashMap;
use hlasm_ls_core::dap::{sinks as dap_sinks, SessionManager};
use hlasm_ls_core::log::NullLogSink;
use hlasm_ls_core::request_manager::{CancelToken, MessageSink, Mode, RequestManager};
use hlasm_ls_core::router::Router;
use hlasm_ls_core::server::{Dialect, LspResponseProvider, MethodEntry, NullTelemetrySink, Server, Telemetry};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn recording_sink() -> (Arc<dyn Fn(Value) + Send + Sync>, Arc<Mutex<Vec<Value>>>) {
    let out = Arc::new(Mutex::new(Vec::new()));
    let out2 = out.clone();
    (Arc::new(move |v: Value| out2.lock().push(v)), out)
}

#[test]
fn initialize_shutdown_exit_cycle_yields_clean_exit_code() {
    let (sink, out) = recording_sink();
    let provider = Arc::new(LspResponseProvider::new(sink));
    let server = Server::new("lsp", Dialect::Lsp, provider, Arc::new(NullTelemetrySink), Arc::new(NullLogSink));
    let token = || CancelToken::from_flag(Arc::new(std::sync::atomic::AtomicBool::new(false)));

    server.message_received(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}), token());
    server.message_received(json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"}), token());
    server.message_received(json!({"jsonrpc": "2.0", "method": "exit"}), token());

    assert_eq!(server.exit_code(), Some(0));
    let messages = out.lock();
    assert_eq!(messages[0]["result"]["capabilities"], json!({}));
    assert_eq!(messages[1]["method"], "initialized");
    assert_eq!(messages[2]["id"], 2);
    assert_eq!(messages[2]["result"], Value::Null);
}

#[test]
fn request_manager_coalescing_reaches_the_workspace_through_the_server() {
    let (sink, _out) = recording_sink();
    let provider = Arc::new(LspResponseProvider::new(sink));
    let server = Server::new("lsp", Dialect::Lsp, provider, Arc::new(NullTelemetrySink), Arc::new(NullLogSink));

    let documents: Arc<DashMap<String, String>> = Arc::new(DashMap::new());
    let documents_for_open = documents.clone();
    server.register(
        "textDocument/didOpen",
        MethodEntry::notification(Telemetry::Timed, move |_server, params, _cancel| {
            std::thread::sleep(Duration::from_millis(30));
            let uri = params["textDocument"]["uri"].as_str().unwrap().to_string();
            let text = params["textDocument"]["text"].as_str().unwrap().to_string();
            documents_for_open.insert(uri, text);
        }),
    );
    let documents_for_change = documents.clone();
    server.register(
        "textDocument/didChange",
        MethodEntry::notification(Telemetry::Timed, move |_server, params, cancel| {
            std::thread::sleep(Duration::from_millis(30));
            if cancel.is_cancelled() {
                return;
            }
            let uri = params["textDocument"]["uri"].as_str().unwrap().to_string();
            let text = params["contentChanges"][0]["text"].as_str().unwrap().to_string();
            documents_for_change.insert(uri, text);
        }),
    );

    let manager = RequestManager::start(Mode::Async, Arc::new(NullLogSink));
    let sink: Arc<dyn MessageSink> = server.clone();

    manager.add_request(
        json!({"jsonrpc": "2.0", "method": "textDocument/didOpen", "params": {"textDocument": {"uri": "a", "text": "x"}}}),
        sink.clone(),
    );
    std::thread::sleep(Duration::from_millis(5));
    manager.add_request(
        json!({"jsonrpc": "2.0", "method": "textDocument/didChange", "params": {"textDocument": {"uri": "a"}, "contentChanges": [{"text": "y"}]}}),
        sink.clone(),
    );
    manager.add_request(
        json!({"jsonrpc": "2.0", "method": "textDocument/didChange", "params": {"textDocument": {"uri": "a"}, "contentChanges": [{"text": "z"}]}}),
        sink.clone(),
    );

    for _ in 0..200 {
        if documents.get("a").map(|v| v.clone()).as_deref() == Some("z") {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    manager.shutdown();

    assert_eq!(documents.get("a").map(|v| v.clone()), Some("z".to_string()));
}

#[test]
fn dap_session_registration_then_initialize_emits_wrapped_response_and_initialized_event() {
    let (outbound, out) = recording_sink();
    let manager = SessionManager::new(outbound, Arc::new(NullLogSink));
    let mut router = Router::new();
    let (registration_predicate, registration_sink, traffic_predicate, traffic_sink) = dap_sinks(manager.clone());
    router.register(registration_predicate, registration_sink);
    router.register(traffic_predicate, traffic_sink);

    router.write(json!({"method": "hlasm/dap_tunnel", "params": {"session_id": 9}}));
    router.write(json!({
        "method": "hlasm/dap_tunnel/9",
        "params": {"type": "request", "seq": 1, "command": "initialize", "arguments": {}}
    }));

    for _ in 0..200 {
        if out.lock().len() >= 2 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    manager.shutdown_all();

    let messages = out.lock();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["method"], "hlasm/dap_tunnel/9");
    assert_eq!(messages[0]["params"]["type"], "response");
    assert_eq!(messages[0]["params"]["command"], "initialize");
    assert_eq!(messages[1]["params"]["type"], "event");
    assert_eq!(messages[1]["params"]["event"], "initialized");
}
