//! Per-machine decision pipeline.
//!
//! Telemetry flows: source → dispatcher → machine worker → (window →
//! detector → safety circuit → executor → bridge) → incident reporter.
//! Every machine's pipeline instance is independent; the only shared state
//! is the read-only configuration.

pub mod dispatcher;
pub mod source;
pub mod worker;

pub use dispatcher::{Dispatcher, PipelineStats};
pub use source::{FrameEvent, ReplaySource, StdinSource, TelemetrySource};
pub use worker::{MachineWorker, WorkerMessage, WorkerStats};
