//! Frame dispatcher: routes telemetry to per-machine workers.
//!
//! Spawns one worker task per configured machine binding and routes inbound
//! frames by `machine_id` over bounded channels. The bounded send applies
//! backpressure to the source instead of buffering without limit, and
//! preserves per-machine arrival order. Machines across bindings run fully
//! in parallel with no shared mutable state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::source::{FrameEvent, TelemetrySource};
use super::worker::{MachineWorker, WorkerMessage, WorkerStats};
use crate::bridge::ProtocolBridge;
use crate::config::defaults::{ROUTE_PROGRESS_INTERVAL, WORKER_CHANNEL_CAPACITY};
use crate::config::PlantConfig;
use crate::reporter::IncidentSink;
use crate::types::TelemetryFrame;

// ============================================================================
// Pipeline Stats
// ============================================================================

/// Aggregate statistics returned when the pipeline shuts down
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub frames_routed: u64,
    pub frames_dropped: u64,
    pub workers: Vec<WorkerStats>,
}

impl PipelineStats {
    pub fn incidents_reported(&self) -> u64 {
        self.workers.iter().map(|w| w.incidents_reported).sum()
    }

    pub fn threats_detected(&self) -> u64 {
        self.workers.iter().map(|w| w.threats_detected).sum()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    join: JoinHandle<WorkerStats>,
}

pub struct Dispatcher {
    workers: HashMap<String, WorkerHandle>,
    cancel: CancellationToken,
    shutdown_grace: Duration,
    frames_routed: u64,
    frames_dropped: u64,
}

impl Dispatcher {
    /// Spawn one worker per machine binding.
    pub fn spawn(
        config: &PlantConfig,
        bridge: Arc<dyn ProtocolBridge>,
        sink: Arc<dyn IncidentSink>,
        cancel: CancellationToken,
    ) -> Self {
        let mut workers = HashMap::new();

        for binding in &config.machines {
            let worker_cancel = cancel.child_token();
            let worker = MachineWorker::new(
                binding,
                config,
                Arc::clone(&bridge),
                Arc::clone(&sink),
                worker_cancel.clone(),
            );
            let (tx, rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
            let join = tokio::spawn(worker.run(rx, worker_cancel));
            workers.insert(binding.machine_id.clone(), WorkerHandle { tx, join });
        }

        if workers.is_empty() {
            warn!("No machines configured, running in monitoring mode only");
        } else {
            info!(machines = workers.len(), "Pipeline workers spawned");
        }

        Self {
            workers,
            cancel,
            shutdown_grace: Duration::from_millis(config.executor.shutdown_grace_ms),
            frames_routed: 0,
            frames_dropped: 0,
        }
    }

    /// Route one frame to its machine's worker.
    ///
    /// Frames for unbound machines are counted and dropped; a machine the
    /// configuration does not cover is not this engine's responsibility.
    pub async fn route(&mut self, frame: TelemetryFrame) {
        match self.workers.get(&frame.machine_id) {
            Some(worker) => {
                if worker.tx.send(WorkerMessage::Frame(frame)).await.is_ok() {
                    self.frames_routed += 1;
                } else {
                    self.frames_dropped += 1;
                }
            }
            None => {
                self.frames_dropped += 1;
                if self.frames_dropped % ROUTE_PROGRESS_INTERVAL == 1 {
                    warn!(
                        machine = %frame.machine_id,
                        dropped = self.frames_dropped,
                        "Telemetry for unbound machine dropped"
                    );
                }
            }
        }
    }

    /// Forward an external approval event to the owning worker.
    ///
    /// Returns false when the machine has no worker.
    pub async fn approve(&self, machine_id: &str, incident_id: &str) -> bool {
        match self.workers.get(machine_id) {
            Some(worker) => worker
                .tx
                .send(WorkerMessage::Approval {
                    incident_id: incident_id.to_string(),
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Run the pipeline until the source is exhausted or shutdown.
    ///
    /// Returns final aggregate statistics.
    pub async fn run<S: TelemetrySource>(mut self, source: &mut S) -> PipelineStats {
        info!("Processing telemetry from {}...", source.source_name());

        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("[Dispatcher] Shutdown signal received");
                    break;
                }
                result = source.next_frame() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!("[Dispatcher] Source error: {}", e);
                        break;
                    }
                },
            };

            let frame = match event {
                FrameEvent::Frame(f) => f,
                FrameEvent::Eof => {
                    info!(
                        "[Dispatcher] Source reached end ({} frames routed)",
                        self.frames_routed
                    );
                    break;
                }
            };

            self.route(frame).await;

            if self.frames_routed % ROUTE_PROGRESS_INTERVAL == 0 && self.frames_routed > 0 {
                info!("Progress: {} frames routed", self.frames_routed);
            }
        }

        self.finish().await
    }

    /// Close worker inboxes, wait out the grace period, and collect stats.
    ///
    /// Workers drain their remaining inbox then exit; any worker still busy
    /// after the grace period is aborted. In-flight executions observe the
    /// cancellation token and record themselves as abandoned, so no action
    /// is left in an ambiguous state.
    pub async fn finish(self) -> PipelineStats {
        let mut stats = PipelineStats {
            frames_routed: self.frames_routed,
            frames_dropped: self.frames_dropped,
            workers: Vec::new(),
        };

        let grace = self.shutdown_grace;
        let joined = futures::future::join_all(self.workers.into_iter().map(
            |(machine_id, handle)| async move {
                drop(handle.tx);
                let abort = handle.join.abort_handle();
                match tokio::time::timeout(grace, handle.join).await {
                    Ok(Ok(worker_stats)) => Some(worker_stats),
                    Ok(Err(e)) => {
                        warn!(machine = %machine_id, error = %e, "Worker task failed");
                        None
                    }
                    Err(_) => {
                        abort.abort();
                        warn!(
                            machine = %machine_id,
                            grace_ms = grace.as_millis() as u64,
                            "Worker did not stop within grace period, aborted"
                        );
                        None
                    }
                }
            },
        ))
        .await;
        stats.workers.extend(joined.into_iter().flatten());

        log_final_stats(&stats);
        stats
    }
}

fn log_final_stats(stats: &PipelineStats) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("FINAL STATISTICS");
    info!("   Frames Routed:      {}", stats.frames_routed);
    info!("   Frames Dropped:     {}", stats.frames_dropped);
    info!("   Threats Detected:   {}", stats.threats_detected());
    info!("   Incidents Reported: {}", stats.incidents_reported());
    for worker in &stats.workers {
        info!(
            "   [{}] frames={} rejected={} threats={} incidents={} executed={} pending={}",
            worker.machine_id,
            worker.frames_processed,
            worker.samples_rejected,
            worker.threats_detected,
            worker.incidents_reported,
            worker.actions_executed,
            worker.pending_at_shutdown,
        );
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
