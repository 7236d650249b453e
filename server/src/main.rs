//! Top-level wiring for the stdio front end: builds the framed channel, the
//! LSP server skeleton, the message router, and the background request
//! manager, then runs the main read loop until the stream ends.

mod cli;
mod features;
mod workspace;

use hlasm_ls_core::broker::{
    external_file_response_predicate, virtual_file_predicate, ExternalFileBroker, VirtualFileProvider,
    VirtualFileSink,
};
use hlasm_ls_core::dap::{sinks as dap_sinks, SessionManager};
use hlasm_ls_core::log::{SharedLogSink, TracingLogSink};
use hlasm_ls_core::request_manager::{MessageSink, Mode, RequestManager};
use hlasm_ls_core::router::Router;
use hlasm_ls_core::server::{Dialect, LspResponseProvider, NullTelemetrySink, Server};
use hlasm_ls_core::transport::Channel;
use serde_json::Value;
use std::io::{stdin, stdout};
use std::sync::Arc;

use workspace::InMemoryWorkspaceManager;

/// No virtual-file backing yet: the actual workspace manager that would
/// answer these queries is out of scope here.
struct NoVirtualFiles;

impl VirtualFileProvider for NoVirtualFiles {
    fn file_content(&self, _id: u64) -> Option<String> {
        None
    }
}

fn init_logging(log_level: u8) {
    let level = match log_level {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    // The protocol stream is stdout; all diagnostic output goes to stderr.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let config = cli::parse(std::env::args().skip(1));
    init_logging(config.log_level);
    if config.lsp_port.is_some() || config.positional_port.is_some() {
        tracing::warn!("TCP stream acquisition is not supported; falling back to stdio");
    }

    let log: SharedLogSink = Arc::new(TracingLogSink);
    let channel = Arc::new(Channel::new(stdin(), stdout(), log.clone()));

    let outbound_channel = channel.clone();
    let outbound_log = log.clone();
    let outbound: Arc<dyn Fn(Value) + Send + Sync> = Arc::new(move |value: Value| {
        if let Err(e) = outbound_channel.write(&value) {
            outbound_log.error("main", &format!("failed to write outbound message: {e}"));
        }
    });

    let lsp_provider = Arc::new(LspResponseProvider::new(outbound.clone()));
    let lsp_server = Server::new(
        "lsp",
        Dialect::Lsp,
        lsp_provider,
        Arc::new(NullTelemetrySink),
        log.clone(),
    );

    let request_manager = RequestManager::start(Mode::Async, log.clone());

    let workspace = InMemoryWorkspaceManager::new();
    features::register(&lsp_server, workspace);

    let mut router = Router::new();

    let session_manager = if config.vscode_extensions {
        let manager = SessionManager::new(outbound.clone(), log.clone());
        let (registration_predicate, registration_sink, traffic_predicate, traffic_sink) =
            dap_sinks(manager.clone());
        router.register(registration_predicate, registration_sink);
        router.register(traffic_predicate, traffic_sink);
        Some(manager)
    } else {
        None
    };

    let external_file_broker = ExternalFileBroker::new(outbound.clone(), log.clone());
    {
        let broker = external_file_broker.clone();
        router.register(
            external_file_response_predicate(),
            Box::new(move |value: Value| {
                if let Some(params) = value.get("params") {
                    broker.handle_response(params);
                }
            }),
        );
    }

    let virtual_file_sink = VirtualFileSink::new(Arc::new(NoVirtualFiles), outbound.clone(), log.clone());
    router.register(
        virtual_file_predicate(),
        Box::new(move |value: Value| virtual_file_sink.handle(value)),
    );

    {
        let manager = request_manager.clone();
        let server: Arc<dyn MessageSink> = lsp_server.clone();
        router.set_default(Box::new(move |value: Value| manager.add_request(value, server.clone())));
    }

    let mut stream_failed = false;
    loop {
        match channel.read() {
            Ok(Some(value)) => router.write(value),
            Ok(None) => continue,
            Err(e) => {
                log.info("main", &format!("input stream ended: {e}"));
                stream_failed = !matches!(e, hlasm_ls_core::error::ChannelError::Eof);
                break;
            }
        }
    }

    let sink: Arc<dyn MessageSink> = lsp_server.clone();
    request_manager.finish_server_requests(&sink);
    request_manager.shutdown();
    if let Some(manager) = session_manager {
        manager.shutdown_all();
    }

    let exit_code = match lsp_server.exit_code() {
        Some(code) if !stream_failed => code,
        _ => 1,
    };
    std::process::exit(exit_code);
}
