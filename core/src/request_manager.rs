//! Request manager: a single-consumer work queue that serializes parse
//! work, coalesces superseded file-edit events, and supports cooperative
//! cancellation.

use crate::log::SharedLogSink;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A shared flag a handler polls to learn it has been superseded or
/// cancelled. The workspace manager MUST poll this; the request manager
/// never forcibly unwinds a running handler.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Anything the request manager can dispatch work to. Implemented by the
/// server skeleton; identity is by `Arc` pointer.
pub trait MessageSink: Send + Sync {
    fn message_received(&self, message: Value, cancel: CancelToken);
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `add_request` enqueues; the worker thread processes sequentially.
    Async,
    /// `add_request` invokes the server inline on the caller's thread. For
    /// tests that need deterministic, synchronous dispatch.
    Sync,
}

struct WorkItem {
    json: Value,
    valid: Arc<AtomicBool>,
    server: Arc<dyn MessageSink>,
    file_identity: Option<String>,
}

struct RunningInfo {
    server: Arc<dyn MessageSink>,
    file: Option<String>,
}

struct Shared {
    queue: Mutex<VecDeque<WorkItem>>,
    not_empty: Condvar,
    running: Mutex<Option<RunningInfo>>,
    done: Condvar,
    /// Cancellation flag for whichever item is currently running. Reset at
    /// the start of each dispatch; `add_request` may set it early when a
    /// new event coalesces with the item in flight. Shared by `Arc` with
    /// the `CancelToken` handed to the handler, so the handler observes
    /// late-arriving cancellation without re-polling the manager.
    cancel: Mutex<Arc<AtomicBool>>,
    end_worker: AtomicBool,
    log: SharedLogSink,
}

pub struct RequestManager {
    shared: Arc<Shared>,
    mode: Mode,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Extracts the file-edit identity of a message, if it has one: `None` for
/// anything outside `textDocument/*`.
fn file_identity(method: &str, params: Option<&Value>) -> Option<String> {
    if !method.starts_with("textDocument/") {
        return None;
    }
    params?
        .get("textDocument")?
        .get("uri")?
        .as_str()
        .map(str::to_string)
}

/// `textDocument/didOpen` and `textDocument/didChange` induce a parse; all
/// other `textDocument/*` events do not.
fn is_parse_inducing(method: &str) -> bool {
    matches!(method, "textDocument/didOpen" | "textDocument/didChange")
}

impl RequestManager {
    pub fn start(mode: Mode, log: SharedLogSink) -> Arc<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            running: Mutex::new(None),
            done: Condvar::new(),
            cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            end_worker: AtomicBool::new(false),
            log,
        });

        let manager = Arc::new(Self {
            shared: shared.clone(),
            mode,
            worker: Mutex::new(None),
        });

        if mode == Mode::Async {
            let handle = std::thread::Builder::new()
                .name("hlasm-request-manager".into())
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn request manager worker thread");
            *manager.worker.lock() = Some(handle);
        }

        manager
    }

    /// Enqueues `message` for `server`. Coalesces with the currently
    /// running and currently queued work for the same file identity when
    /// the new event is parse-inducing.
    pub fn add_request(&self, message: Value, server: Arc<dyn MessageSink>) {
        let method = message.get("method").and_then(Value::as_str).map(str::to_string);
        let identity = method
            .as_deref()
            .and_then(|m| file_identity(m, message.get("params")));
        let parse_inducing = method.as_deref().map(is_parse_inducing).unwrap_or(false);

        if self.mode == Mode::Sync {
            let token = CancelToken(Arc::new(AtomicBool::new(false)));
            server.message_received(message, token);
            return;
        }

        let valid = Arc::new(AtomicBool::new(true));
        let mut queue = self.shared.queue.lock();

        if parse_inducing {
            if let Some(uri) = &identity {
                let running = self.shared.running.lock();
                let supersedes_running = running
                    .as_ref()
                    .map(|r| Arc::ptr_eq(&r.server, &server) && r.file.as_deref() == Some(uri.as_str()))
                    .unwrap_or(false);
                drop(running);
                if supersedes_running {
                    self.shared.cancel.lock().store(true, Ordering::SeqCst);
                }
                for item in queue.iter() {
                    if Arc::ptr_eq(&item.server, &server) && item.file_identity.as_deref() == Some(uri.as_str()) {
                        item.valid.store(false, Ordering::SeqCst);
                    }
                }
            }
        }

        let was_empty = queue.is_empty();
        queue.push_back(WorkItem {
            json: message,
            valid,
            server,
            file_identity: identity,
        });
        if was_empty {
            self.shared.not_empty.notify_one();
        }
    }

    /// Cancels and waits out any in-flight work belonging to `server`, then
    /// runs its remaining queued items inline (flushing teardown events
    /// like `didClose`) and erases them.
    pub fn finish_server_requests(&self, server: &Arc<dyn MessageSink>) {
        self.shared.cancel.lock().store(true, Ordering::SeqCst);
        {
            let mut running = self.shared.running.lock();
            while running
                .as_ref()
                .map(|r| Arc::ptr_eq(&r.server, server))
                .unwrap_or(false)
            {
                self.shared.done.wait(&mut running);
            }
        }

        let drained: Vec<WorkItem> = {
            let mut queue = self.shared.queue.lock();
            let mut remaining = VecDeque::with_capacity(queue.len());
            let mut drained = Vec::new();
            for item in queue.drain(..) {
                if Arc::ptr_eq(&item.server, server) {
                    drained.push(item);
                } else {
                    remaining.push_back(item);
                }
            }
            *queue = remaining;
            drained
        };

        for item in drained {
            let token = CancelToken(Arc::new(AtomicBool::new(true)));
            server.message_received(item.json, token);
        }
    }

    /// Signals worker termination and joins it. Idempotent.
    pub fn shutdown(&self) {
        self.shared.end_worker.store(true, Ordering::SeqCst);
        {
            let _queue = self.shared.queue.lock();
            self.shared.not_empty.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let item = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(item) = queue.pop_front() {
                    break Some(item);
                }
                if shared.end_worker.load(Ordering::SeqCst) {
                    break None;
                }
                shared.not_empty.wait(&mut queue);
            }
        };

        let item = match item {
            Some(item) => item,
            None => break,
        };

        let cancel_flag = Arc::new(AtomicBool::new(!item.valid.load(Ordering::SeqCst)));
        *shared.cancel.lock() = cancel_flag.clone();

        {
            let mut running = shared.running.lock();
            *running = Some(RunningInfo {
                server: item.server.clone(),
                file: item.file_identity.clone(),
            });
        }

        item.server
            .message_received(item.json, CancelToken(cancel_flag));

        {
            let mut running = shared.running.lock();
            *running = None;
        }
        shared.done.notify_all();
    }

    shared.log.debug("request_manager", "worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullLogSink;
    use parking_lot::Mutex as PMutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct RecordingSink {
        events: Arc<PMutex<Vec<(Value, bool)>>>,
        delay: Duration,
    }

    impl MessageSink for RecordingSink {
        fn message_received(&self, message: Value, cancel: CancelToken) {
            std::thread::sleep(self.delay);
            self.events.lock().push((message, cancel.is_cancelled()));
        }
    }

    fn log() -> SharedLogSink {
        Arc::new(NullLogSink)
    }

    #[test]
    fn sync_mode_dispatches_inline() {
        let manager = RequestManager::start(Mode::Sync, log());
        let events = Arc::new(PMutex::new(Vec::new()));
        let sink: Arc<dyn MessageSink> = Arc::new(RecordingSink {
            events: events.clone(),
            delay: Duration::ZERO,
        });
        manager.add_request(json!({"method": "foo"}), sink);
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn async_mode_processes_in_background() {
        let manager = RequestManager::start(Mode::Async, log());
        let events = Arc::new(PMutex::new(Vec::new()));
        let sink: Arc<dyn MessageSink> = Arc::new(RecordingSink {
            events: events.clone(),
            delay: Duration::ZERO,
        });
        manager.add_request(json!({"method": "foo"}), sink);
        for _ in 0..100 {
            if events.lock().len() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(events.lock().len(), 1);
        manager.shutdown();
    }

    #[test]
    fn coalesces_same_uri_did_change_events() {
        let manager = RequestManager::start(Mode::Async, log());
        let events = Arc::new(PMutex::new(Vec::new()));
        let sink: Arc<dyn MessageSink> = Arc::new(RecordingSink {
            events: events.clone(),
            delay: Duration::from_millis(50),
        });

        manager.add_request(
            json!({"method": "textDocument/didOpen", "params": {"textDocument": {"uri": "a"}, "text": "x"}}),
            sink.clone(),
        );
        std::thread::sleep(Duration::from_millis(5));
        manager.add_request(
            json!({"method": "textDocument/didChange", "params": {"textDocument": {"uri": "a"}, "text": "y"}}),
            sink.clone(),
        );
        manager.add_request(
            json!({"method": "textDocument/didChange", "params": {"textDocument": {"uri": "a"}, "text": "z"}}),
            sink.clone(),
        );

        for _ in 0..200 {
            if events.lock().len() == 3 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let recorded = events.lock();
        assert_eq!(recorded.len(), 3);
        // didOpen ran (and was cancelled mid-flight by the first didChange).
        assert_eq!(recorded[0].0["params"]["text"], "x");
        assert!(recorded[0].1);
        // The final processed event is the last didChange, "z".
        assert_eq!(recorded[2].0["params"]["text"], "z");
        manager.shutdown();
    }
}
