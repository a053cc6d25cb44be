//! Incident records handed to the external persistence boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ActionStatus, AgentType, DecisionOutcome, ExecutionResult, SafetyZone, Severity, Threat,
};

/// Execution summary embedded in the outbound incident record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub attempted: bool,
    pub succeeded: bool,
    pub retries_used: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_error: Option<String>,
}

impl From<&ExecutionResult> for ExecutionSummary {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            attempted: result.attempted,
            succeeded: result.succeeded,
            retries_used: result.retries_used,
            final_error: result.final_error.map(|e| e.to_string()),
        }
    }
}

/// Immutable aggregate of one completed decision cycle
///
/// Created once per cycle and handed to the external store; never mutated
/// afterward. Resolution and operator acknowledgement live in the external
/// system, so `resolved` is always `false` at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    pub machine_id: String,
    pub severity: Severity,
    pub incident_type: String,
    pub message: String,
    pub detected_value: f64,
    pub threshold_value: f64,
    pub action_taken: String,
    pub action_status: ActionStatus,
    pub action_zone: SafetyZone,
    pub agent_type: AgentType,
    pub z_score: f64,
    pub rate_of_change: f64,
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub execution: ExecutionSummary,
}

impl Incident {
    /// Assemble the incident for a completed decision cycle.
    pub fn from_cycle(
        threat: &Threat,
        decision: &DecisionOutcome,
        execution: &ExecutionResult,
        agent_type: AgentType,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            incident_id: new_incident_id(),
            machine_id: threat.machine_id.clone(),
            severity: threat.severity,
            incident_type: threat.kind.incident_type().to_string(),
            message: threat.message.clone(),
            detected_value: threat.detected_value,
            threshold_value: threat.threshold_value,
            action_taken: decision.action.name().to_string(),
            action_status: decision.status,
            action_zone: decision.zone,
            agent_type,
            z_score: threat.z_score,
            rate_of_change: threat.rate_of_change,
            resolved: false,
            detected_at,
            completed_at: Utc::now(),
            execution: ExecutionSummary::from(execution),
        }
    }
}

/// Short uppercase incident ID, e.g. `INC-1A2B3C4D`.
fn new_incident_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("INC-{}", id[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ThreatKind};

    #[test]
    fn test_incident_assembly() {
        let threat = Threat {
            machine_id: "CNC-001".to_string(),
            metric: "spindle_temp".to_string(),
            kind: ThreatKind::ThermalRunaway,
            detected_value: 85.0,
            threshold_value: 75.0,
            z_score: 5.0,
            rate_of_change: 2.0,
            severity: Severity::Critical,
            message: "spindle temperature 85.0 exceeds emergency bound".to_string(),
        };
        let decision = DecisionOutcome {
            zone: SafetyZone::Red,
            action: Action::EmergencyStop,
            status: ActionStatus::AlertOnly,
        };
        let incident = Incident::from_cycle(
            &threat,
            &decision,
            &ExecutionResult::not_attempted(),
            AgentType::Precision,
            Utc::now(),
        );

        assert!(incident.incident_id.starts_with("INC-"));
        assert_eq!(incident.incident_id.len(), "INC-".len() + 8);
        assert_eq!(incident.incident_type, "thermal_runaway");
        assert_eq!(incident.action_taken, "EmergencyStop");
        assert!(!incident.resolved);
        assert!(!incident.execution.attempted);
    }
}
