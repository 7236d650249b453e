//! Injected logging capability.
//!
//! Components hold a `LogSink` rather than reaching for a global logger, so
//! tests can swap in a recording sink and multiple front ends (stdio server,
//! DAP session workers) can tag their output independently.

use std::sync::Arc;

/// Severity levels, ordered low to high. Mirrors the three levels the
/// front end's `--log-level` flag selects between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A logging capability injected into components that need to emit
/// diagnostics. `component` is attached to every record so multiplexed
/// sessions (e.g. one per DAP session) can be told apart in shared output.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, component: &str, message: &str);

    fn debug(&self, component: &str, message: &str) {
        self.log(Level::Debug, component, message);
    }
    fn info(&self, component: &str, message: &str) {
        self.log(Level::Info, component, message);
    }
    fn warn(&self, component: &str, message: &str) {
        self.log(Level::Warn, component, message);
    }
    fn error(&self, component: &str, message: &str) {
        self.log(Level::Error, component, message);
    }
}

pub type SharedLogSink = Arc<dyn LogSink>;

/// Default sink forwarding to the `tracing` crate.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: Level, component: &str, message: &str) {
        match level {
            Level::Debug => tracing::debug!(component, "{}", message),
            Level::Info => tracing::info!(component, "{}", message),
            Level::Warn => tracing::warn!(component, "{}", message),
            Level::Error => tracing::error!(component, "{}", message),
        }
    }
}

/// Sink that swallows everything. Useful as a default for components built
/// in isolation by tests.
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _level: Level, _component: &str, _message: &str) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingLogSink {
        pub records: Mutex<Vec<(Level, String, String)>>,
    }

    impl LogSink for RecordingLogSink {
        fn log(&self, level: Level, component: &str, message: &str) {
            self.records
                .lock()
                .push((level, component.to_string(), message.to_string()));
        }
    }
}
