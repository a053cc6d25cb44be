//! Threat model: severity ladder, safety zones, and typed threat records

use serde::{Deserialize, Serialize};

// ============================================================================
// Severity & Safety Zones
// ============================================================================

/// Severity of a detected threat
///
/// Ordered so that `max()` over a batch picks the most severe finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    /// Map severity to the safety zone it drives the circuit toward.
    pub fn zone(self) -> SafetyZone {
        match self {
            Severity::Low | Severity::Medium => SafetyZone::Green,
            Severity::High => SafetyZone::Yellow,
            Severity::Critical => SafetyZone::Red,
        }
    }

    /// Escalate by one response tier (used for rate-of-change breaches).
    ///
    /// Green-band severities jump to the Yellow band; Yellow to Red; Red caps.
    pub fn escalate_tier(self) -> Severity {
        match self {
            Severity::Low | Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Safety Circuit response zone
///
/// - **Green**: low risk, bounded corrective actions auto-execute
/// - **Yellow**: medium risk, actions queue for operator approval
/// - **Red**: high risk, alert only; human intervention required
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyZone {
    #[default]
    Green,
    Yellow,
    Red,
}

impl std::fmt::Display for SafetyZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyZone::Green => write!(f, "green"),
            SafetyZone::Yellow => write!(f, "yellow"),
            SafetyZone::Red => write!(f, "red"),
        }
    }
}

// ============================================================================
// Threat Kinds
// ============================================================================

/// Classified failure mode behind a threat
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ThreatKind {
    /// Excessive spindle vibration (chatter / bearing wear signature)
    SpindleVibration,
    /// Spindle temperature climbing out of band
    ThermalRunaway,
    /// Thermal expansion drift affecting positional accuracy
    ThermalDrift,
    /// Spindle load above the learned cutting baseline
    ToolOverload,
    /// Cleanroom particle count above the ISO class limit
    Contamination,
    /// Differential pressure outside the filter-clog band
    PressureAnomaly,
    /// Chemical concentration above the exposure threshold
    ChemicalLeak,
    /// FFU airflow below the laminar-flow floor
    AirflowFailure,
    /// Ultrasonic impedance non-stick signature on the bond pad
    BondNonStick,
    /// Bond-site temperature out of band
    BondOverheat,
    /// Bond cycle time drifting above the throughput ceiling
    CycleTimeDrift,
}

impl ThreatKind {
    /// Stable incident-type identifier for the outbound incident schema.
    pub fn incident_type(self) -> &'static str {
        match self {
            ThreatKind::SpindleVibration => "spindle_vibration",
            ThreatKind::ThermalRunaway => "thermal_runaway",
            ThreatKind::ThermalDrift => "thermal_drift",
            ThreatKind::ToolOverload => "tool_overload",
            ThreatKind::Contamination => "contamination",
            ThreatKind::PressureAnomaly => "pressure_anomaly",
            ThreatKind::ChemicalLeak => "chemical_leak",
            ThreatKind::AirflowFailure => "airflow_failure",
            ThreatKind::BondNonStick => "bond_non_stick",
            ThreatKind::BondOverheat => "bond_overheat",
            ThreatKind::CycleTimeDrift => "cycle_time_drift",
        }
    }
}

impl std::fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.incident_type())
    }
}

// ============================================================================
// Threat Record
// ============================================================================

/// A detected threat for one machine/metric pairing
///
/// Created by the detector from a window snapshot; read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub machine_id: String,
    pub metric: String,
    pub kind: ThreatKind,
    /// The reading that triggered the detection
    pub detected_value: f64,
    /// The configured or derived bound it breached
    pub threshold_value: f64,
    /// Standard deviations from the rolling baseline
    pub z_score: f64,
    /// First difference of the metric (units/min)
    pub rate_of_change: f64,
    pub severity: Severity,
    /// Operator-facing description
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert!(SafetyZone::Green < SafetyZone::Yellow);
        assert!(SafetyZone::Yellow < SafetyZone::Red);
    }

    #[test]
    fn test_severity_zone_mapping() {
        assert_eq!(Severity::Low.zone(), SafetyZone::Green);
        assert_eq!(Severity::Medium.zone(), SafetyZone::Green);
        assert_eq!(Severity::High.zone(), SafetyZone::Yellow);
        assert_eq!(Severity::Critical.zone(), SafetyZone::Red);
    }

    #[test]
    fn test_tier_escalation_caps_at_critical() {
        assert_eq!(Severity::Low.escalate_tier(), Severity::High);
        assert_eq!(Severity::Medium.escalate_tier(), Severity::High);
        assert_eq!(Severity::High.escalate_tier(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate_tier(), Severity::Critical);
    }
}
