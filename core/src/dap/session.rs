//! One live DAP conversation multiplexed on the single LSP channel: a
//! dedicated worker thread, an inbound queue, and an embedded DAP server.

use super::envelope;
use crate::log::SharedLogSink;
use crate::request_manager::CancelToken;
use crate::server::{Dialect, NullTelemetrySink, DapResponseProvider, Server};
use crate::transport::BlockingQueue;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct DapSession {
    id: u64,
    queue: Arc<BlockingQueue<Value>>,
    running: Arc<AtomicBool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    pub server: Arc<Server>,
}

impl DapSession {
    /// `outbound` writes a fully-wrapped tunnel envelope to the shared
    /// main channel.
    pub fn spawn(id: u64, outbound: Arc<dyn Fn(Value) + Send + Sync>, log: SharedLogSink) -> Arc<Self> {
        let wrapping_sink: Arc<dyn Fn(Value) + Send + Sync> = {
            let outbound = outbound.clone();
            Arc::new(move |dap_message: Value| outbound(envelope::wrap(id, dap_message)))
        };
        let response_provider = Arc::new(DapResponseProvider::new(wrapping_sink));
        let server = Server::new(
            format!("dap-session-{id}"),
            Dialect::Dap,
            response_provider,
            Arc::new(NullTelemetrySink),
            log.clone(),
        );

        let queue = Arc::new(BlockingQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let worker_queue = queue.clone();
        let worker_running = running.clone();
        let worker_server = server.clone();
        let worker_log = log;
        let handle = std::thread::Builder::new()
            .name(format!("hlasm-dap-session-{id}"))
            .spawn(move || session_worker_loop(worker_queue, worker_running, worker_server, worker_log))
            .expect("failed to spawn DAP session worker thread");

        Arc::new(Self {
            id,
            queue,
            running,
            worker: parking_lot::Mutex::new(Some(handle)),
            server,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Forwards an already-unwrapped-by-nothing tunnel envelope to this
    /// session's inbound queue.
    pub fn dispatch(&self, envelope: Value) {
        self.queue.push(envelope);
    }

    /// Terminates the inbound queue and joins the worker thread.
    pub fn shutdown(&self) {
        self.queue.terminate();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

fn session_worker_loop(
    queue: Arc<BlockingQueue<Value>>,
    running: Arc<AtomicBool>,
    server: Arc<Server>,
    log: SharedLogSink,
) {
    use crate::request_manager::MessageSink;

    while let Some(tunnel_envelope) = queue.pop() {
        let Some(dap_message) = envelope::unwrap(&tunnel_envelope) else {
            log.warn("dap_session", "tunnel envelope missing params");
            continue;
        };
        let cancel = CancelToken::from_flag(Arc::new(AtomicBool::new(false)));
        server.message_received(dap_message, cancel);
        if server.exit_received() {
            break;
        }
    }
    running.store(false, Ordering::SeqCst);
    queue.terminate();
}
