//! Telemetry-timing emission. Where the events ultimately go is a backend
//! concern; only the emission contract is implemented here.

use serde_json::Value;

/// `{ method, duration_sec, metrics? }`, emitted for every method whose
/// table entry requests `Telemetry::Timed`, plus the synthetic
/// `error_type` variant used for method-level failures on notifications.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub method: String,
    pub duration_sec: f64,
    pub metrics: Option<Value>,
    pub error_type: Option<String>,
}

pub trait TelemetrySink: Send + Sync {
    fn telemetry_info(&self, event: TelemetryEvent);
}

/// Default sink: swallows every event. Real deployments swap this for a
/// sink that forwards to whatever telemetry backend the client negotiates.
#[derive(Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn telemetry_info(&self, _event: TelemetryEvent) {}
}
