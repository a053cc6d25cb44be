//! Incident Reporter
//!
//! Hands completed incidents to the external persistence/notification
//! boundary. Delivery is best-effort: a sink failure is logged and dropped,
//! never propagated, so incident plumbing can never stall a machine's
//! control loop.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::types::Incident;

/// External incident boundary (store, API, message bus)
#[async_trait]
pub trait IncidentSink: Send + Sync {
    async fn deliver(&self, incident: &Incident) -> anyhow::Result<()>;
}

/// Default sink: structured log line with the full incident payload.
///
/// Stands in for the external store in development and replay runs.
pub struct LogSink;

#[async_trait]
impl IncidentSink for LogSink {
    async fn deliver(&self, incident: &Incident) -> anyhow::Result<()> {
        let payload = serde_json::to_string(incident)?;
        info!(
            incident_id = %incident.incident_id,
            machine = %incident.machine_id,
            zone = %incident.action_zone,
            status = %incident.action_status,
            payload = %payload,
            "Incident recorded"
        );
        Ok(())
    }
}

/// Best-effort hand-off wrapper used by the pipeline workers.
pub async fn hand_off(sink: &dyn IncidentSink, incident: &Incident) {
    if let Err(e) = sink.deliver(incident).await {
        warn!(
            incident_id = %incident.incident_id,
            machine = %incident.machine_id,
            error = %e,
            "Incident hand-off failed, continuing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Action, ActionStatus, AgentType, DecisionOutcome, ExecutionResult, SafetyZone, Severity,
        Threat, ThreatKind,
    };

    struct FailingSink;

    #[async_trait]
    impl IncidentSink for FailingSink {
        async fn deliver(&self, _incident: &Incident) -> anyhow::Result<()> {
            anyhow::bail!("store unreachable")
        }
    }

    fn incident() -> Incident {
        let threat = Threat {
            machine_id: "FAC-001".to_string(),
            metric: "particle_count".to_string(),
            kind: ThreatKind::Contamination,
            detected_value: 4000.0,
            threshold_value: 3520.0,
            z_score: 2.4,
            rate_of_change: 0.0,
            severity: Severity::High,
            message: "particle excursion".to_string(),
        };
        let decision = DecisionOutcome {
            zone: SafetyZone::Yellow,
            action: Action::FeedHold {
                reason: "particle excursion".to_string(),
            },
            status: ActionStatus::PendingApproval,
        };
        Incident::from_cycle(
            &threat,
            &decision,
            &ExecutionResult::not_attempted(),
            AgentType::Facility,
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_sink_failure_never_propagates() {
        // hand_off swallows the error; reaching the end of the test is the
        // assertion.
        hand_off(&FailingSink, &incident()).await;
    }

    #[tokio::test]
    async fn test_log_sink_accepts_incident() {
        assert!(LogSink.deliver(&incident()).await.is_ok());
    }
}
