//! External-file broker: correlates numeric request ids with
//! callbacks, wakes the originating worker thread, and cancels outstanding
//! requests when the worker unregisters.

use crate::log::SharedLogSink;
use crate::router::Predicate;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

pub const RESPONSE_METHOD: &str = "external_file_response";
pub const REQUEST_METHOD: &str = "external_file_request";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileOp {
    ReadFile,
    ListDirectory,
}

impl FileOp {
    fn as_str(self) -> &'static str {
        match self {
            FileOp::ReadFile => "read_file",
            FileOp::ListDirectory => "list_directory",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExternalFileResult {
    Content(String),
    Listing(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct BrokerErrorPayload {
    pub code: i64,
    pub msg: String,
}

impl BrokerErrorPayload {
    fn new(code: i64, msg: impl Into<String>) -> Self {
        Self { code, msg: msg.into() }
    }
}

type Resolver = Box<dyn FnOnce(Result<ExternalFileResult, BrokerErrorPayload>) + Send>;
type Wakeup = Arc<dyn Fn() + Send + Sync>;

struct PendingRequest {
    thread_id: ThreadId,
    op: FileOp,
    resolver: Resolver,
}

pub struct ExternalFileBroker {
    pending: DashMap<u64, PendingRequest>,
    registrations: DashMap<ThreadId, Wakeup>,
    next_id: AtomicU64,
    outbound: Arc<dyn Fn(Value) + Send + Sync>,
    log: SharedLogSink,
}

/// RAII guard returned by [`ExternalFileBroker::register_thread`]. Dropping
/// it erases every pending record owned by the thread and removes the
/// wakeup, so a disappearing worker cannot be blamed for an orphan
/// response and its in-flight requests are implicitly cancelled.
pub struct ThreadRegistration {
    broker: Arc<ExternalFileBroker>,
    thread_id: ThreadId,
}

impl Drop for ThreadRegistration {
    fn drop(&mut self) {
        self.broker.deregister_thread(self.thread_id);
    }
}

impl ExternalFileBroker {
    pub fn new(outbound: Arc<dyn Fn(Value) + Send + Sync>, log: SharedLogSink) -> Arc<Self> {
        Arc::new(Self {
            pending: DashMap::new(),
            registrations: DashMap::new(),
            next_id: AtomicU64::new(0),
            outbound,
            log,
        })
    }

    pub fn register_thread(self: &Arc<Self>, wakeup: Wakeup) -> ThreadRegistration {
        let thread_id = std::thread::current().id();
        self.registrations.insert(thread_id, wakeup);
        ThreadRegistration {
            broker: self.clone(),
            thread_id,
        }
    }

    fn deregister_thread(&self, thread_id: ThreadId) {
        self.registrations.remove(&thread_id);
        self.pending.retain(|_, pending| pending.thread_id != thread_id);
    }

    /// Issues a request. If the calling thread never registered, the
    /// resolver is invoked immediately with a `message_send` failure and
    /// nothing is written.
    pub fn request(&self, op: FileOp, url: &str, resolver: Resolver) {
        let thread_id = std::thread::current().id();
        if !self.registrations.contains_key(&thread_id) {
            resolver(Err(BrokerErrorPayload::new(-101, "message_send")));
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.insert(id, PendingRequest { thread_id, op, resolver });
        (self.outbound)(json!({
            "jsonrpc": "2.0",
            "method": REQUEST_METHOD,
            "params": { "id": id, "op": op.as_str(), "url": url },
        }));
    }

    pub fn read_file(&self, url: &str, resolver: Resolver) {
        self.request(FileOp::ReadFile, url, resolver);
    }

    pub fn list_directory(&self, url: &str, resolver: Resolver) {
        self.request(FileOp::ListDirectory, url, resolver);
    }

    /// Handles an inbound `external_file_response`. A response for an id
    /// that is no longer pending (already invalidated by a dropped thread
    /// registration) is a silent no-op.
    pub fn handle_response(&self, params: &Value) {
        let Some(id) = params.get("id").and_then(Value::as_u64) else {
            self.log.warn("external_file_broker", "response missing id");
            return;
        };
        let Some((_, pending)) = self.pending.remove(&id) else {
            return;
        };
        let PendingRequest { thread_id, op, resolver } = pending;

        if let Some(error) = params.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let msg = error
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            resolver(Err(BrokerErrorPayload::new(code, msg)));
        } else if let Some(data) = params.get("data") {
            match decode(op, data) {
                Some(result) => resolver(Ok(result)),
                None => resolver(Err(BrokerErrorPayload::new(-100, "invalid_json"))),
            }
        } else {
            resolver(Err(BrokerErrorPayload::new(-1, "Unknown error")));
        }

        let wakeup = self.registrations.get(&thread_id).map(|r| r.clone());
        if let Some(wakeup) = wakeup {
            wakeup();
        }
    }
}

fn decode(op: FileOp, data: &Value) -> Option<ExternalFileResult> {
    match op {
        FileOp::ReadFile => data.as_str().map(|s| ExternalFileResult::Content(s.to_string())),
        FileOp::ListDirectory => {
            let urls = data.get("member_urls")?.as_array()?;
            Some(ExternalFileResult::Listing(
                urls.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            ))
        }
    }
}

pub fn response_predicate() -> Predicate {
    crate::router::method_is(RESPONSE_METHOD)
}
