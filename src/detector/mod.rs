//! Physics-Aware Detectors
//!
//! Maps window snapshots plus per-agent-type static thresholds into typed
//! threats. Agent types are a closed set selected at configuration time by
//! the machine binding, so dispatch is a plain enum rather than trait
//! objects, and every threshold table is data-driven from `plant_config.toml`.
//!
//! All three detectors share the same severity arithmetic:
//! - z-score bands: `z < warning_z` stays in the Green band, `warning_z <= z
//!   < critical_z` is Yellow-band (High), `z >= critical_z` is Red-band
//!   (Critical)
//! - absolute equipment bounds contribute their own tier
//! - a rate-of-change breach escalates the combined result by one tier,
//!   capped at Critical

use crate::config::{MachineBinding, SeverityConfig, ThresholdTables};
use crate::types::{AgentMetadata, AgentType, Severity, Threat, ThreatKind};
use crate::window::WindowSnapshot;

mod assembly;
mod facility;
mod precision;

pub use assembly::AssemblyDetector;
pub use facility::FacilityDetector;
pub use precision::PrecisionDetector;

// ============================================================================
// Metric Identifiers
// ============================================================================

/// Canonical telemetry metric IDs per equipment class
pub mod metrics {
    // Precision (CNC machining)
    /// Spindle vibration (mm/s RMS)
    pub const SPINDLE_VIBRATION: &str = "spindle_vibration";
    /// Spindle temperature (°C)
    pub const SPINDLE_TEMP: &str = "spindle_temp";
    /// Spindle load (% of rated)
    pub const SPINDLE_LOAD: &str = "spindle_load";

    // Facility (cleanroom / infrastructure)
    /// 0.5 µm particle concentration (particles/m³)
    pub const PARTICLE_COUNT: &str = "particle_count";
    /// Filter differential pressure (Pa)
    pub const DIFFERENTIAL_PRESSURE: &str = "differential_pressure";
    /// Chemical concentration (ppm)
    pub const CHEMICAL_PPM: &str = "chemical_ppm";
    /// FFU face velocity (m/s)
    pub const AIRFLOW: &str = "airflow";

    // Assembly (wire bonding)
    /// Ultrasonic transducer impedance (Ω)
    pub const USG_IMPEDANCE: &str = "usg_impedance";
    /// Bond-site temperature (°C)
    pub const BOND_TEMP: &str = "bond_temp";
    /// Bond cycle time (ms)
    pub const CYCLE_TIME: &str = "cycle_time_ms";
}

// ============================================================================
// Shared Severity Arithmetic
// ============================================================================

/// Severity contributed by the z-score alone, if any.
pub(crate) fn z_band(z_score: f64, severity: &SeverityConfig) -> Option<Severity> {
    let z = z_score.abs();
    if z >= severity.critical_z {
        Some(Severity::Critical)
    } else if z >= severity.warning_z {
        Some(Severity::High)
    } else {
        None
    }
}

/// Combine an absolute-bound tier with the z-band tier and apply the
/// rate-of-change escalation. Returns `None` when neither source triggered.
pub(crate) fn grade(
    absolute: Option<Severity>,
    snapshot: &WindowSnapshot,
    roc_breached: bool,
    severity: &SeverityConfig,
) -> Option<Severity> {
    let base = match (absolute, z_band(snapshot.z_score, severity)) {
        (None, None) => return None,
        (Some(a), None) => a,
        (None, Some(z)) => z,
        (Some(a), Some(z)) => a.max(z),
    };
    Some(if roc_breached {
        base.escalate_tier()
    } else {
        base
    })
}

/// Warning threshold derived from the baseline when no absolute bound was the
/// trigger: `mean + warning_z * std`.
pub(crate) fn derived_warning_threshold(snapshot: &WindowSnapshot, severity: &SeverityConfig) -> f64 {
    snapshot.mean + severity.warning_z * snapshot.std_dev
}

/// Shared threat constructor so every detector stamps the same evidence.
#[allow(clippy::too_many_arguments)]
pub(crate) fn threat(
    machine_id: &str,
    metric: &str,
    kind: ThreatKind,
    detected_value: f64,
    threshold_value: f64,
    snapshot: &WindowSnapshot,
    severity: Severity,
    message: String,
) -> Threat {
    Threat {
        machine_id: machine_id.to_string(),
        metric: metric.to_string(),
        kind,
        detected_value,
        threshold_value,
        z_score: snapshot.z_score,
        rate_of_change: snapshot.rate_of_change,
        severity,
        message,
    }
}

// ============================================================================
// Detector Dispatch
// ============================================================================

enum DetectorKind {
    Precision(PrecisionDetector),
    Facility(FacilityDetector),
    Assembly(AssemblyDetector),
}

/// Per-machine detector, bound to one agent type at configuration time
pub struct Detector {
    meta: AgentMetadata,
    inner: DetectorKind,
}

impl Detector {
    /// Build the detector for a machine binding, pulling the agent type's
    /// threshold table from the loaded configuration.
    pub fn for_machine(
        binding: &MachineBinding,
        tables: &ThresholdTables,
        severity: &SeverityConfig,
    ) -> Self {
        let meta = AgentMetadata::new(binding.agent_type, &binding.machine_id, binding.protocol());
        let inner = match binding.agent_type {
            AgentType::Precision => DetectorKind::Precision(PrecisionDetector::new(
                &binding.machine_id,
                tables.precision.clone(),
                severity.clone(),
            )),
            AgentType::Facility => DetectorKind::Facility(FacilityDetector::new(
                &binding.machine_id,
                tables.facility.clone(),
                severity.clone(),
            )),
            AgentType::Assembly => DetectorKind::Assembly(AssemblyDetector::new(
                &binding.machine_id,
                tables.assembly.clone(),
                severity.clone(),
            )),
        };
        Self { meta, inner }
    }

    /// Analyze one metric snapshot. Pure function of snapshot + thresholds
    /// except for the assembly non-stick run counter.
    ///
    /// Returns nothing while the window is still warming up: unreliable
    /// statistics must read as "no threat", not "no anomaly".
    pub fn analyze(&mut self, metric: &str, snapshot: &WindowSnapshot) -> Vec<Threat> {
        if snapshot.insufficient_data {
            return Vec::new();
        }
        match &mut self.inner {
            DetectorKind::Precision(d) => d.analyze(metric, snapshot),
            DetectorKind::Facility(d) => d.analyze(metric, snapshot),
            DetectorKind::Assembly(d) => d.analyze(metric, snapshot),
        }
    }

    /// Registration metadata for the external agent registry.
    pub fn metadata(&self) -> &AgentMetadata {
        &self.meta
    }

    pub fn agent_type(&self) -> AgentType {
        self.meta.agent_type
    }

    /// Coverage predicate used by the transport router.
    pub fn can_handle(&self, machine_id: &str) -> bool {
        self.meta.can_handle(machine_id)
    }
}
