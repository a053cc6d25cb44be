//! Action model: corrective actions, decision outcomes, and execution results

use serde::{Deserialize, Serialize};

use super::SafetyZone;

// ============================================================================
// Actions
// ============================================================================

/// Corrective action selected by the Safety Circuit
///
/// Each variant carries the data the protocol bridge needs to render an
/// equipment command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Action {
    /// Bounded setpoint adjustment (Green tier only)
    AdjustParameter {
        name: String,
        new_value: f64,
        unit: String,
    },
    /// Reduce feed/spindle/line speed by a percentage
    ReduceSpeed { percent: u8 },
    /// Create a maintenance window for a component
    ScheduleMaintenance { component: String, urgency: String },
    /// Hold material feed without powering down
    FeedHold { reason: String },
    /// Immediate stop; the only command the circuit raises at Red
    EmergencyStop,
    /// No actuation; notify operators only
    AlertOnly,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AdjustParameter { .. } => "AdjustParameter",
            Action::ReduceSpeed { .. } => "ReduceSpeed",
            Action::ScheduleMaintenance { .. } => "ScheduleMaintenance",
            Action::FeedHold { .. } => "FeedHold",
            Action::EmergencyStop => "EmergencyStop",
            Action::AlertOnly => "AlertOnly",
        }
    }

    /// Whether this action results in a command on the equipment link.
    ///
    /// `AlertOnly` and `ScheduleMaintenance` are operator-side outcomes and
    /// never reach the protocol bridge.
    pub fn is_actuating(&self) -> bool {
        !matches!(self, Action::AlertOnly | Action::ScheduleMaintenance { .. })
    }
}

/// How the Safety Circuit dispositioned an action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Executed autonomously (Green tier)
    AutoExecuted,
    /// Parked until an operator approval event arrives (Yellow tier)
    PendingApproval,
    /// Raised as an alert; never executed autonomously (Red tier)
    AlertOnly,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::AutoExecuted => write!(f, "auto_executed"),
            ActionStatus::PendingApproval => write!(f, "pending_approval"),
            ActionStatus::AlertOnly => write!(f, "alert_only"),
        }
    }
}

/// The Safety Circuit's verdict for one decision cycle
///
/// Assigned once by the circuit and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub zone: SafetyZone,
    pub action: Action,
    pub status: ActionStatus,
}

// ============================================================================
// Execution Results
// ============================================================================

/// Terminal classification of a failed or interrupted execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("equipment busy")]
    CommandBusy,
    #[error("equipment paused")]
    CommandPaused,
    #[error("command rejected as invalid")]
    CommandInvalid,
    #[error("command requires supervisory unlock")]
    CommandLocked,
    #[error("bridge round-trip exceeded deadline")]
    TransportTimeout,
    #[error("equipment link lost")]
    ConnectionLost,
    #[error("execution abandoned during shutdown")]
    Abandoned,
}

impl ExecutionError {
    /// Transient failures are retried; the rest stop the retry loop.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ExecutionError::CommandBusy
                | ExecutionError::CommandPaused
                | ExecutionError::TransportTimeout
        )
    }
}

/// Outcome of the executor's retry loop for one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether any submit attempt was made
    pub attempted: bool,
    pub succeeded: bool,
    /// Number of submit attempts made (not just re-attempts)
    pub retries_used: u32,
    pub final_error: Option<ExecutionError>,
}

impl ExecutionResult {
    /// The action never reached the bridge (alert-only / parked decisions).
    pub fn not_attempted() -> Self {
        Self {
            attempted: false,
            succeeded: false,
            retries_used: 0,
            final_error: None,
        }
    }

    pub fn success(retries_used: u32) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            retries_used,
            final_error: None,
        }
    }

    pub fn failed(retries_used: u32, error: ExecutionError) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            retries_used,
            final_error: Some(error),
        }
    }

    /// Shutdown interrupted the retry sequence; the terminal state is
    /// recorded explicitly so no execution is left ambiguous.
    pub fn abandoned(retries_used: u32) -> Self {
        Self {
            attempted: retries_used > 0,
            succeeded: false,
            retries_used,
            final_error: Some(ExecutionError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExecutionError::CommandBusy.is_retryable());
        assert!(ExecutionError::CommandPaused.is_retryable());
        assert!(ExecutionError::TransportTimeout.is_retryable());
        assert!(!ExecutionError::CommandInvalid.is_retryable());
        assert!(!ExecutionError::CommandLocked.is_retryable());
        assert!(!ExecutionError::ConnectionLost.is_retryable());
        assert!(!ExecutionError::Abandoned.is_retryable());
    }

    #[test]
    fn test_actuating_actions() {
        assert!(Action::EmergencyStop.is_actuating());
        assert!(Action::ReduceSpeed { percent: 20 }.is_actuating());
        assert!(!Action::AlertOnly.is_actuating());
        assert!(!Action::ScheduleMaintenance {
            component: "spindle".to_string(),
            urgency: "within_24h".to_string()
        }
        .is_actuating());
    }
}
