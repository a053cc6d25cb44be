//! Per-machine pipeline worker.
//!
//! Each configured machine gets exactly one worker task that owns that
//! machine's metric windows, detector, safety circuit, and executor. All
//! communication happens over the worker's inbox channel, so per-machine
//! mutable state needs no locks and telemetry is processed in strict arrival
//! order. One decision cycle runs to completion (including any retrying
//! execution) before the next frame is taken, which also guarantees two
//! commands are never in flight for the same machine.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{render_command, ProtocolBridge};
use crate::circuit::{CircuitDecision, SafetyCircuit};
use crate::config::{MachineBinding, PlantConfig, WindowConfig};
use crate::detector::Detector;
use crate::executor::{ActionExecutor, RetryPolicy};
use crate::reporter::{hand_off, IncidentSink};
use crate::types::{
    ActionStatus, ExecutionResult, Incident, TelemetryFrame, Threat, DecisionOutcome,
};
use crate::window::MetricWindow;

// ============================================================================
// Worker Messages & Stats
// ============================================================================

/// Messages accepted by a machine worker
#[derive(Debug)]
pub enum WorkerMessage {
    /// One inbound telemetry frame for this machine
    Frame(TelemetryFrame),
    /// External approval for a parked Yellow-tier action, keyed by the
    /// incident ID that announced it
    Approval { incident_id: String },
}

/// Counters reported when a worker exits
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub machine_id: String,
    pub frames_processed: u64,
    pub samples_rejected: u64,
    pub threats_detected: u64,
    pub incidents_reported: u64,
    pub actions_executed: u64,
    /// Yellow-tier actions still awaiting approval at shutdown
    pub pending_at_shutdown: u64,
}

/// A Yellow-tier action parked until approval arrives
struct PendingAction {
    decision: DecisionOutcome,
    threat: Threat,
    detected_at: DateTime<Utc>,
}

// ============================================================================
// Machine Worker
// ============================================================================

pub struct MachineWorker {
    machine_id: String,
    window_config: WindowConfig,
    windows: HashMap<String, MetricWindow>,
    detector: Detector,
    circuit: SafetyCircuit,
    executor: ActionExecutor,
    sink: Arc<dyn IncidentSink>,
    pending: HashMap<String, PendingAction>,
    stats: WorkerStats,
}

impl MachineWorker {
    pub fn new(
        binding: &MachineBinding,
        config: &PlantConfig,
        bridge: Arc<dyn ProtocolBridge>,
        sink: Arc<dyn IncidentSink>,
        cancel: CancellationToken,
    ) -> Self {
        let detector = Detector::for_machine(binding, &config.thresholds, &config.severity);
        let circuit = SafetyCircuit::new(
            &binding.machine_id,
            config.circuit.clone(),
            config.severity.emergency_z,
        );
        let executor =
            ActionExecutor::new(bridge, RetryPolicy::from_config(&config.executor), cancel);

        Self {
            machine_id: binding.machine_id.clone(),
            window_config: config.window.clone(),
            windows: HashMap::new(),
            detector,
            circuit,
            executor,
            sink,
            pending: HashMap::new(),
            stats: WorkerStats {
                machine_id: binding.machine_id.clone(),
                frames_processed: 0,
                samples_rejected: 0,
                threats_detected: 0,
                incidents_reported: 0,
                actions_executed: 0,
                pending_at_shutdown: 0,
            },
        }
    }

    /// Run until the inbox closes or shutdown is signalled.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<WorkerMessage>,
        cancel: CancellationToken,
    ) -> WorkerStats {
        info!(
            machine = %self.machine_id,
            agent_type = %self.detector.agent_type(),
            "Worker started"
        );

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => {
                    info!(machine = %self.machine_id, "Worker shutdown signal received");
                    break;
                }
                msg = inbox.recv() => match msg {
                    Some(m) => m,
                    None => break,
                },
            };

            match message {
                WorkerMessage::Frame(frame) => self.process_frame(frame).await,
                WorkerMessage::Approval { incident_id } => {
                    self.process_approval(&incident_id).await;
                }
            }
        }

        self.stats.pending_at_shutdown = self.pending.len() as u64;
        if !self.pending.is_empty() {
            warn!(
                machine = %self.machine_id,
                pending = self.pending.len(),
                "Worker exiting with unapproved actions"
            );
        }
        self.stats
    }

    /// One full decision cycle: ingest every reading, detect, run the
    /// circuit, and realize at most one action.
    async fn process_frame(&mut self, frame: TelemetryFrame) {
        let detected_at = Utc::now();
        let mut threats: Vec<Threat> = Vec::new();

        for sample in frame.samples() {
            let window = self
                .windows
                .entry(sample.metric.clone())
                .or_insert_with(|| MetricWindow::from_config(&sample.metric, &self.window_config));

            match window.ingest(&sample) {
                Ok(snapshot) => {
                    threats.extend(self.detector.analyze(&sample.metric, &snapshot));
                }
                Err(e) => {
                    self.stats.samples_rejected += 1;
                    debug!(machine = %self.machine_id, error = %e, "Sample rejected");
                }
            }
        }

        self.stats.threats_detected += threats.len() as u64;
        self.stats.frames_processed += 1;

        if let Some(decision) = self.circuit.observe(&threats, frame.timestamp) {
            self.resolve_decision(decision, detected_at).await;
        }
    }

    /// Realize one confirmed circuit decision.
    async fn resolve_decision(&mut self, decision: CircuitDecision, detected_at: DateTime<Utc>) {
        let CircuitDecision { outcome, threat } = decision;

        match outcome.status {
            ActionStatus::AutoExecuted => {
                let execution = if outcome.action.is_actuating() {
                    let command =
                        render_command(&outcome.action, self.detector.metadata(), &threat.message);
                    self.stats.actions_executed += 1;
                    self.executor.execute(&command).await
                } else {
                    ExecutionResult::not_attempted()
                };
                self.report(&threat, &outcome, &execution, detected_at).await;
            }
            ActionStatus::PendingApproval => {
                warn!(
                    machine = %self.machine_id,
                    action = outcome.action.name(),
                    "YELLOW zone: action queued for operator approval"
                );
                let incident_id = self
                    .report(&threat, &outcome, &ExecutionResult::not_attempted(), detected_at)
                    .await;
                self.pending.insert(
                    incident_id,
                    PendingAction {
                        decision: outcome,
                        threat,
                        detected_at,
                    },
                );
            }
            ActionStatus::AlertOnly => {
                error!(
                    machine = %self.machine_id,
                    action = outcome.action.name(),
                    threat = %threat.kind,
                    "RED zone: human intervention required, no autonomous action"
                );
                self.report(&threat, &outcome, &ExecutionResult::not_attempted(), detected_at)
                    .await;
            }
        }
    }

    /// Execute a previously parked action once approval arrives.
    ///
    /// Approval delivery is an external concern; by the time the event
    /// reaches this worker the action's status still reads
    /// `pending_approval` in the follow-up incident, with the execution
    /// summary attached.
    async fn process_approval(&mut self, incident_id: &str) {
        let Some(parked) = self.pending.remove(incident_id) else {
            warn!(
                machine = %self.machine_id,
                incident_id,
                "Approval for unknown or already-resolved action"
            );
            return;
        };

        info!(
            machine = %self.machine_id,
            incident_id,
            action = parked.decision.action.name(),
            "Approval received, executing"
        );

        let execution = if parked.decision.action.is_actuating() {
            let command = render_command(
                &parked.decision.action,
                self.detector.metadata(),
                &parked.threat.message,
            );
            self.stats.actions_executed += 1;
            self.executor.execute(&command).await
        } else {
            // Maintenance scheduling is realized operator-side
            ExecutionResult::not_attempted()
        };

        self.report(&parked.threat, &parked.decision, &execution, parked.detected_at)
            .await;
    }

    /// Assemble and hand off an incident; returns its ID for the approval
    /// registry.
    async fn report(
        &mut self,
        threat: &Threat,
        outcome: &DecisionOutcome,
        execution: &ExecutionResult,
        detected_at: DateTime<Utc>,
    ) -> String {
        let incident = Incident::from_cycle(
            threat,
            outcome,
            execution,
            self.detector.agent_type(),
            detected_at,
        );
        let incident_id = incident.incident_id.clone();
        hand_off(self.sink.as_ref(), &incident).await;
        self.stats.incidents_reported += 1;
        incident_id
    }
}
