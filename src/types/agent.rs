//! Agent bindings: equipment classes, protocols, and registration metadata

use serde::{Deserialize, Serialize};

/// Class of equipment an agent specializes in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// CNC machining centers, mills, lathes
    Precision,
    /// Cleanroom and facility infrastructure (FFU, HVAC, gas monitoring)
    Facility,
    /// Wire bonding and packaging equipment
    Assembly,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::Precision => write!(f, "precision"),
            AgentType::Facility => write!(f, "facility"),
            AgentType::Assembly => write!(f, "assembly"),
        }
    }
}

/// Equipment command protocol spoken on the far side of the bridge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Motion-controller command channel (CNC)
    MotionControl,
    /// Facility/building control bus
    FacilityBus,
    /// SECS-II remote commands via a GEM sidecar (wire bonders)
    SecsGem,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::MotionControl => write!(f, "motion-control"),
            Protocol::FacilityBus => write!(f, "facility-bus"),
            Protocol::SecsGem => write!(f, "secs-gem"),
        }
    }
}

impl Protocol {
    /// Conventional protocol for an agent type, used when a machine binding
    /// does not specify one.
    pub fn default_for(agent_type: AgentType) -> Self {
        match agent_type {
            AgentType::Precision => Protocol::MotionControl,
            AgentType::Facility => Protocol::FacilityBus,
            AgentType::Assembly => Protocol::SecsGem,
        }
    }
}

/// Capability identifiers advertised per agent type
///
/// These feed the external registry's heartbeat/registration payload; the
/// core only exposes them through [`AgentMetadata`].
pub mod capabilities {
    pub const Z_SCORE_ANALYSIS: &str = "z_score_analysis";
    pub const RATE_OF_CHANGE_ANALYSIS: &str = "rate_of_change_analysis";
    pub const THERMAL_DRIFT_DETECTION: &str = "thermal_drift_detection";
    pub const TOOL_LOAD_TRACKING: &str = "tool_load_tracking";
    pub const CHATTER_DETECTION: &str = "chatter_detection";
    pub const ISO_14644_COMPLIANCE: &str = "iso_14644_compliance";
    pub const PARTICLE_MONITORING: &str = "particle_monitoring";
    pub const CHEMICAL_LEAK_DETECTION: &str = "chemical_leak_detection";
    pub const NSOP_DETECTION: &str = "nsop_detection";
    pub const ULTRASONIC_MONITORING: &str = "ultrasonic_monitoring";
    pub const CYCLE_TIME_TRACKING: &str = "cycle_time_tracking";
}

/// Per-machine agent binding exposed for external registration
///
/// Static configuration: loaded once, read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub machine_id: String,
    pub protocol: Protocol,
    pub capabilities: Vec<String>,
}

impl AgentMetadata {
    pub fn new(agent_type: AgentType, machine_id: &str, protocol: Protocol) -> Self {
        let caps: &[&str] = match agent_type {
            AgentType::Precision => &[
                capabilities::Z_SCORE_ANALYSIS,
                capabilities::RATE_OF_CHANGE_ANALYSIS,
                capabilities::CHATTER_DETECTION,
                capabilities::THERMAL_DRIFT_DETECTION,
                capabilities::TOOL_LOAD_TRACKING,
            ],
            AgentType::Facility => &[
                capabilities::Z_SCORE_ANALYSIS,
                capabilities::RATE_OF_CHANGE_ANALYSIS,
                capabilities::ISO_14644_COMPLIANCE,
                capabilities::PARTICLE_MONITORING,
                capabilities::CHEMICAL_LEAK_DETECTION,
            ],
            AgentType::Assembly => &[
                capabilities::Z_SCORE_ANALYSIS,
                capabilities::RATE_OF_CHANGE_ANALYSIS,
                capabilities::NSOP_DETECTION,
                capabilities::ULTRASONIC_MONITORING,
                capabilities::CYCLE_TIME_TRACKING,
            ],
        };

        Self {
            agent_id: format!("agent-{}-{}", agent_type, machine_id.to_lowercase()),
            agent_type,
            machine_id: machine_id.to_string(),
            protocol,
            capabilities: caps.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Coverage predicate for the external registry.
    pub fn can_handle(&self, machine_id: &str) -> bool {
        self.machine_id == machine_id
    }
}
