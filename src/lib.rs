//! VIGIL Edge: Autonomous Decision Engine for Fabrication Equipment
//!
//! Ingests streaming sensor telemetry, computes statistical anomaly signals,
//! classifies detected threats into a 3-tier safety policy, and either
//! autonomously actuates a bounded corrective command, queues the action for
//! operator approval, or raises an alert without actuating.
//!
//! ## Architecture
//!
//! - **Telemetry Window**: bounded per-machine, per-metric rolling statistics
//! - **Physics-Aware Detectors**: precision / facility / assembly classifiers
//! - **Safety Circuit**: debounced Green/Yellow/Red state machine
//! - **Action Executor**: bounded-retry command dispatch with failure
//!   classification
//! - **Protocol Bridge**: abstract action → equipment command translation
//!   (motion control, facility bus, SECS/GEM-style)
//! - **Incident Reporter**: best-effort hand-off to the external store

pub mod bridge;
pub mod circuit;
pub mod config;
pub mod detector;
pub mod executor;
pub mod pipeline;
pub mod reporter;
pub mod types;
pub mod window;

// Re-export plant configuration
pub use config::PlantConfig;

// Re-export commonly used types
pub use types::{
    Action, ActionStatus, AgentMetadata, AgentType, DecisionOutcome, ExecutionError,
    ExecutionResult, Incident, Protocol, SafetyZone, Severity, TelemetryFrame, TelemetrySample,
    Threat, ThreatKind,
};

// Re-export pipeline components
pub use pipeline::{Dispatcher, PipelineStats};

// Re-export the statistical core
pub use window::{MetricWindow, WindowSnapshot};

// Re-export the safety circuit
pub use circuit::{CircuitDecision, SafetyCircuit, ZoneStreak};

// Re-export the bridge contract
pub use bridge::{AckCode, AckResult, EquipmentCommand, ProtocolBridge};
