//! The server skeleton shared by the LSP and DAP dialects, plus the
//! two `ResponseProvider` implementations (DAP response-provider
//! polymorphism vs LSP response-provider polymorphism collapse to this one
//! capability) and progress/telemetry support.

mod method;
mod progress;
mod response_provider;
mod skeleton;
mod telemetry;

pub use method::{HandlerKind, MethodEntry, Telemetry};
pub use progress::{ProgressKind, ProgressState, ProgressTracker};
pub use response_provider::{DapResponseProvider, LspResponseProvider, OutboundSink, ResponseProvider};
pub use skeleton::{Dialect, Server};
pub use telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink};
