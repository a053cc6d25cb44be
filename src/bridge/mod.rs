//! Protocol Bridge Adapter
//!
//! Translates abstract actions into protocol-specific equipment commands and
//! classifies the equipment's structured acknowledgment for the executor.
//! The bridge itself is a thin contract: the actual transport (message bus,
//! GEM sidecar, PLC gateway) lives outside this crate and is reached through
//! [`ProtocolBridge::submit`]. [`ChannelBridge`] is the stock pass-through
//! implementation over an in-process request/response channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::types::{Action, AgentMetadata, Protocol};

// ============================================================================
// Acknowledgment Taxonomy
// ============================================================================

/// Protocol-agnostic classification of an equipment acknowledgment
///
/// Canonical wire codes: `0 = Accepted`, `1 = Busy`, `2 = Invalid`,
/// `3 = Paused`, `4 = Locked`. Codes `5..=63` are reserved and anything
/// unknown is treated as `Invalid`: an acknowledgment this side cannot
/// interpret must never be retried blindly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AckCode {
    /// Command accepted for execution
    Accepted,
    /// Equipment temporarily occupied; retry
    Busy,
    /// Malformed or unsupported command; do not retry
    Invalid,
    /// Equipment paused; retry after resume
    Paused,
    /// Requires supervisory override; escalate, do not retry
    Locked,
}

impl AckCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AckCode::Accepted,
            1 => AckCode::Busy,
            2 => AckCode::Invalid,
            3 => AckCode::Paused,
            4 => AckCode::Locked,
            // 5..=63 reserved, and anything beyond the field width
            _ => AckCode::Invalid,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AckCode::Accepted => 0,
            AckCode::Busy => 1,
            AckCode::Invalid => 2,
            AckCode::Paused => 3,
            AckCode::Locked => 4,
        }
    }
}

/// Per-parameter acknowledgment code, where the protocol reports them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamAck {
    pub name: String,
    pub code: u8,
}

/// Structured acknowledgment returned by the equipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResult {
    pub code: AckCode,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_acks: Vec<ParamAck>,
}

impl AckResult {
    pub fn from_code(code: u8) -> Self {
        let code = AckCode::from_code(code);
        Self {
            code,
            accepted: code == AckCode::Accepted,
            param_acks: Vec::new(),
        }
    }

    pub fn accepted() -> Self {
        Self::from_code(0)
    }
}

// ============================================================================
// Equipment Command
// ============================================================================

/// One numeric command parameter (CPNAME/CPVAL style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandParam {
    pub name: String,
    pub value: f64,
}

/// Protocol-level command rendered from an [`Action`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentCommand {
    /// Abstract action name (e.g. `EmergencyStop`)
    pub action: String,
    pub machine_id: String,
    /// Operator-facing reason, carried through to the audit trail
    pub reason: String,
    pub protocol: Protocol,
    /// SECS stream selector; absent for non-SECS protocols
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secs_stream: Option<u8>,
    /// SECS function selector; absent for non-SECS protocols
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secs_function: Option<u8>,
    pub command_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<CommandParam>,
}

/// SECS-II Host Command Send selector (S2F41)
pub const SECS_HOST_COMMAND_STREAM: u8 = 2;
pub const SECS_HOST_COMMAND_FUNCTION: u8 = 41;

/// Render an action into the command vocabulary of the target protocol.
///
/// Non-actuating actions (`AlertOnly`, `ScheduleMaintenance`) have no
/// command rendering; callers gate on [`Action::is_actuating`] first.
pub fn render_command(action: &Action, meta: &AgentMetadata, reason: &str) -> EquipmentCommand {
    let (command_name, params) = match (meta.protocol, action) {
        (Protocol::SecsGem, Action::AdjustParameter { name, new_value, .. }) => (
            "BOND_FORCE_ADJ",
            vec![CommandParam {
                name: name.to_uppercase(),
                value: *new_value,
            }],
        ),
        (Protocol::SecsGem, Action::ReduceSpeed { percent }) => (
            "RATE_ADJ",
            vec![CommandParam {
                name: "RATE_PCT".to_string(),
                value: f64::from(*percent),
            }],
        ),
        (Protocol::SecsGem, Action::FeedHold { .. }) => ("STOP", Vec::new()),
        (Protocol::SecsGem, _) => ("ABORT", Vec::new()),

        (Protocol::MotionControl, Action::AdjustParameter { name, new_value, .. }) => (
            "PARAM_SET",
            vec![CommandParam {
                name: name.to_uppercase(),
                value: *new_value,
            }],
        ),
        (Protocol::MotionControl, Action::ReduceSpeed { percent }) => (
            "SPEED_OVERRIDE",
            vec![CommandParam {
                name: "PERCENT".to_string(),
                value: f64::from(*percent),
            }],
        ),
        (Protocol::MotionControl, Action::FeedHold { .. }) => ("FEED_HOLD", Vec::new()),
        (Protocol::MotionControl, _) => ("EMERGENCY_STOP", Vec::new()),

        (Protocol::FacilityBus, Action::AdjustParameter { name, new_value, .. }) => (
            "SETPOINT_ADJ",
            vec![CommandParam {
                name: name.to_uppercase(),
                value: *new_value,
            }],
        ),
        (Protocol::FacilityBus, Action::ReduceSpeed { percent }) => (
            "OUTPUT_LIMIT",
            vec![CommandParam {
                name: "PERCENT".to_string(),
                value: f64::from(*percent),
            }],
        ),
        (Protocol::FacilityBus, Action::FeedHold { .. }) => ("HOLD", Vec::new()),
        (Protocol::FacilityBus, _) => ("UNIT_SHUTDOWN", Vec::new()),
    };

    let (secs_stream, secs_function) = if meta.protocol == Protocol::SecsGem {
        (
            Some(SECS_HOST_COMMAND_STREAM),
            Some(SECS_HOST_COMMAND_FUNCTION),
        )
    } else {
        (None, None)
    };

    EquipmentCommand {
        action: action.name().to_string(),
        machine_id: meta.machine_id.clone(),
        reason: reason.to_string(),
        protocol: meta.protocol,
        secs_stream,
        secs_function,
        command_name: command_name.to_string(),
        params,
    }
}

// ============================================================================
// Bridge Contract
// ============================================================================

/// Transport-level bridge failures, distinct from equipment rejections
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge round-trip exceeded deadline")]
    Timeout,

    #[error("equipment link lost")]
    ConnectionLost,

    #[error("bridge channel error: {0}")]
    Channel(String),
}

/// Contract between the executor and whatever speaks to the equipment
#[async_trait]
pub trait ProtocolBridge: Send + Sync {
    /// Submit one command and wait for the structured acknowledgment.
    async fn submit(&self, command: &EquipmentCommand) -> Result<AckResult, BridgeError>;
}

// ============================================================================
// Channel Bridge (stock pass-through)
// ============================================================================

/// One in-flight bridge round trip
pub struct BridgeRequest {
    pub command: EquipmentCommand,
    pub reply: oneshot::Sender<AckResult>,
}

/// Pass-through bridge over an in-process request/response channel.
///
/// The far side of the channel is the external transport task (e.g. a
/// message-bus round trip to a GEM sidecar). This type owns only the
/// deadline; dropping the reply sender reads as a lost link.
pub struct ChannelBridge {
    tx: mpsc::Sender<BridgeRequest>,
    timeout: Duration,
}

impl ChannelBridge {
    pub fn new(tx: mpsc::Sender<BridgeRequest>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }
}

#[async_trait]
impl ProtocolBridge for ChannelBridge {
    async fn submit(&self, command: &EquipmentCommand) -> Result<AckResult, BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BridgeRequest {
                command: command.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::ConnectionLost)?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(BridgeError::ConnectionLost),
            Err(_) => Err(BridgeError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentType;

    #[test]
    fn test_ack_code_table() {
        assert_eq!(AckCode::from_code(0), AckCode::Accepted);
        assert_eq!(AckCode::from_code(1), AckCode::Busy);
        assert_eq!(AckCode::from_code(2), AckCode::Invalid);
        assert_eq!(AckCode::from_code(3), AckCode::Paused);
        assert_eq!(AckCode::from_code(4), AckCode::Locked);
        // Reserved range and out-of-range both read as Invalid
        for code in 5..=63u8 {
            assert_eq!(AckCode::from_code(code), AckCode::Invalid);
        }
        assert_eq!(AckCode::from_code(200), AckCode::Invalid);
    }

    #[test]
    fn test_ack_result_accepted_flag() {
        assert!(AckResult::from_code(0).accepted);
        assert!(!AckResult::from_code(1).accepted);
        assert!(!AckResult::from_code(7).accepted);
    }

    #[test]
    fn test_secs_rendering_carries_stream_function() {
        let meta = AgentMetadata::new(AgentType::Assembly, "BOND-01", Protocol::SecsGem);
        let action = Action::AdjustParameter {
            name: "bond_force".to_string(),
            new_value: 5.0,
            unit: "percent".to_string(),
        };
        let cmd = render_command(&action, &meta, "bounded trim");

        assert_eq!(cmd.secs_stream, Some(2));
        assert_eq!(cmd.secs_function, Some(41));
        assert_eq!(cmd.command_name, "BOND_FORCE_ADJ");
        assert_eq!(cmd.params[0].name, "BOND_FORCE");
        assert_eq!(cmd.machine_id, "BOND-01");
    }

    #[test]
    fn test_motion_rendering() {
        let meta = AgentMetadata::new(AgentType::Precision, "CNC-001", Protocol::MotionControl);

        let cmd = render_command(&Action::EmergencyStop, &meta, "thermal runaway");
        assert_eq!(cmd.command_name, "EMERGENCY_STOP");
        assert_eq!(cmd.secs_stream, None);
        assert!(cmd.params.is_empty());

        let cmd = render_command(&Action::ReduceSpeed { percent: 20 }, &meta, "vibration");
        assert_eq!(cmd.command_name, "SPEED_OVERRIDE");
        assert!((cmd.params[0].value - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_channel_bridge_round_trip() {
        let (tx, mut rx) = mpsc::channel::<BridgeRequest>(4);
        let bridge = ChannelBridge::new(tx, Duration::from_secs(1));

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let _ = request.reply.send(AckResult::accepted());
            }
        });

        let meta = AgentMetadata::new(AgentType::Facility, "FAC-001", Protocol::FacilityBus);
        let cmd = render_command(&Action::FeedHold { reason: "hold".to_string() }, &meta, "hold");
        let ack = bridge.submit(&cmd).await.expect("round trip");
        assert!(ack.accepted);
    }

    #[tokio::test]
    async fn test_channel_bridge_dropped_reply_is_connection_lost() {
        let (tx, mut rx) = mpsc::channel::<BridgeRequest>(4);
        let bridge = ChannelBridge::new(tx, Duration::from_secs(1));

        tokio::spawn(async move {
            // Drop the reply sender without answering
            let _ = rx.recv().await;
        });

        let meta = AgentMetadata::new(AgentType::Precision, "CNC-001", Protocol::MotionControl);
        let cmd = render_command(&Action::EmergencyStop, &meta, "test");
        let err = bridge.submit(&cmd).await.expect_err("lost link");
        assert!(matches!(err, BridgeError::ConnectionLost));
    }
}
