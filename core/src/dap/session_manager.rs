//! The session manager: registers new DAP sessions and forwards
//! per-session traffic to the right inbound queue.

use super::envelope::{self, REGISTRATION_METHOD};
use super::session::DapSession;
use crate::log::SharedLogSink;
use crate::router::{Predicate, Sink};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

pub struct SessionManager {
    sessions: DashMap<u64, Arc<DapSession>>,
    outbound: Arc<dyn Fn(Value) + Send + Sync>,
    log: SharedLogSink,
}

impl SessionManager {
    pub fn new(outbound: Arc<dyn Fn(Value) + Send + Sync>, log: SharedLogSink) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            outbound,
            log,
        })
    }

    /// Drops any no-longer-running sessions, then spawns a new one for
    /// `session_id`. If `session_id` is still live after the sweep, the
    /// new registration is ignored.
    pub fn register(&self, session_id: u64) {
        self.sessions.retain(|_, session| session.is_running());

        if self.sessions.contains_key(&session_id) {
            self.log.warn(
                "dap_session_manager",
                &format!("ignoring registration for already-live session {session_id}"),
            );
            return;
        }

        let session = DapSession::spawn(session_id, self.outbound.clone(), self.log.clone());
        self.sessions.insert(session_id, session);
    }

    /// Forwards a per-session tunnel envelope to its queue. Unknown
    /// session ids are logged and dropped.
    pub fn dispatch(&self, session_id: u64, envelope: Value) {
        match self.sessions.get(&session_id) {
            Some(session) => session.dispatch(envelope),
            None => self.log.warn(
                "dap_session_manager",
                &format!("no session for tunnel traffic: {session_id}"),
            ),
        }
    }

    pub fn handle_registration(&self, envelope: &Value) {
        let Some(session_id) = envelope
            .get("params")
            .and_then(|p| p.get("session_id"))
            .and_then(Value::as_u64)
        else {
            self.log
                .warn("dap_session_manager", "registration missing params.session_id");
            return;
        };
        self.register(session_id);
    }

    pub fn handle_traffic(&self, envelope: Value) {
        let Some(method) = envelope.get("method").and_then(Value::as_str) else {
            return;
        };
        if let Some(session_id) = envelope::session_id_of(method) {
            self.dispatch(session_id, envelope);
        }
    }

    /// Terminates every session's queue and joins its worker thread.
    pub fn shutdown_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
        self.sessions.clear();
    }
}

/// Router predicate matching the session-registration method.
pub fn registration_predicate() -> Predicate {
    crate::router::method_is(REGISTRATION_METHOD)
}

/// Router predicate matching any per-session tunnel traffic.
pub fn traffic_predicate() -> Predicate {
    Box::new(|value: &Value| {
        value
            .get("method")
            .and_then(Value::as_str)
            .map(|m| envelope::session_id_of(m).is_some())
            .unwrap_or(false)
    })
}

/// Builds the two router sinks a top-level wiring registers for the
/// session manager: registration first, then traffic (order matters only
/// in that both predicates are mutually exclusive).
pub fn sinks(manager: Arc<SessionManager>) -> (Predicate, Sink, Predicate, Sink) {
    let m1 = manager.clone();
    let registration_sink: Sink = Box::new(move |envelope: Value| m1.handle_registration(&envelope));
    let m2 = manager;
    let traffic_sink: Sink = Box::new(move |envelope: Value| m2.handle_traffic(envelope));
    (registration_predicate(), registration_sink, traffic_predicate(), traffic_sink)
}
