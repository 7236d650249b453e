//! Message router: predicate-routed fan-out of one source to N sinks.

use serde_json::Value;

/// A cheap, side-effect-free test of whether a message belongs to a sink.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// A registered destination. Consumes the message it accepts.
pub type Sink = Box<dyn Fn(Value) + Send + Sync>;

/// Ordered `(predicate, sink)` entries plus an optional default sink. The
/// router is the sole inbound fan-out point: DAP tunneling, external-file
/// responses, and virtual-file requests are all realized as registered
/// predicates here rather than special-cased in the main loop.
pub struct Router {
    entries: Vec<(Predicate, Sink)>,
    default: Option<Sink>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default: None,
        }
    }

    /// Registers a `(predicate, sink)` pair. Entries are tried in
    /// registration order; the first match wins.
    pub fn register(&mut self, predicate: Predicate, sink: Sink) {
        self.entries.push((predicate, sink));
    }

    pub fn set_default(&mut self, sink: Sink) {
        self.default = Some(sink);
    }

    /// Delivers `message` to the first matching sink, the default sink if
    /// none match, or drops it if neither exists.
    pub fn write(&self, message: Value) {
        for (predicate, sink) in &self.entries {
            if predicate(&message) {
                sink(message);
                return;
            }
        }
        if let Some(default) = &self.default {
            default(message);
        }
    }
}

/// Builds a predicate that matches messages whose `method` field equals
/// `method` exactly. The common case for router entries.
pub fn method_is(method: impl Into<String>) -> Predicate {
    let method = method.into();
    Box::new(move |value: &Value| value.get("method").and_then(Value::as_str) == Some(method.as_str()))
}
