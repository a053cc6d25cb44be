//! Facility detector - cleanroom and infrastructure units (FFU, HVAC, gas)
//!
//! Particle counts grade against the ISO 14644-1 class limit for 0.5 µm
//! particles; filter health against the differential-pressure band; chemical
//! monitors against the exposure threshold; FFU airflow against the laminar
//! floor. Airflow and impedance-style metrics fail *downward*, so the
//! absolute checks run on the low side while the z-band still grades by
//! deviation magnitude.

use crate::config::{FacilityThresholds, SeverityConfig};
use crate::types::{Severity, Threat, ThreatKind};
use crate::window::WindowSnapshot;

use super::{derived_warning_threshold, grade, metrics, threat};

pub struct FacilityDetector {
    machine_id: String,
    thresholds: FacilityThresholds,
    severity: SeverityConfig,
}

impl FacilityDetector {
    pub fn new(machine_id: &str, thresholds: FacilityThresholds, severity: SeverityConfig) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            thresholds,
            severity,
        }
    }

    pub fn analyze(&self, metric: &str, snapshot: &WindowSnapshot) -> Vec<Threat> {
        let found = match metric {
            metrics::PARTICLE_COUNT => self.check_contamination(snapshot),
            metrics::DIFFERENTIAL_PRESSURE => self.check_filter_pressure(snapshot),
            metrics::CHEMICAL_PPM => self.check_chemical(snapshot),
            metrics::AIRFLOW => self.check_airflow(snapshot),
            _ => None,
        };
        found.into_iter().collect()
    }

    fn check_contamination(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let count = snapshot.value;
        let limit = t.particle_limit();

        let absolute = if count > 2.0 * limit {
            Some(Severity::Critical)
        } else if count > limit {
            Some(Severity::High)
        } else if count > t.particle_warn_fraction * limit {
            Some(Severity::Medium)
        } else {
            None
        };

        let severity = grade(absolute, snapshot, false, &self.severity)?;

        Some(threat(
            &self.machine_id,
            metrics::PARTICLE_COUNT,
            ThreatKind::Contamination,
            count,
            limit,
            snapshot,
            severity,
            format!(
                "Particle count {count:.0}/m³ against ISO class {} limit {limit:.0}/m³",
                t.iso_class
            ),
        ))
    }

    fn check_filter_pressure(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let dp = snapshot.value;

        let absolute = if dp >= t.pressure_drop_crit_pa {
            Some(Severity::High)
        } else if dp >= t.pressure_drop_warn_pa {
            Some(Severity::Medium)
        } else {
            None
        };

        let severity = grade(absolute, snapshot, false, &self.severity)?;
        let threshold = if absolute.is_some() {
            t.pressure_drop_warn_pa
        } else {
            derived_warning_threshold(snapshot, &self.severity)
        };

        Some(threat(
            &self.machine_id,
            metrics::DIFFERENTIAL_PRESSURE,
            ThreatKind::PressureAnomaly,
            dp,
            threshold,
            snapshot,
            severity,
            format!("Filter differential pressure {dp:.0} Pa, end-of-life band starts at {:.0} Pa",
                t.pressure_drop_warn_pa
            ),
        ))
    }

    fn check_chemical(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let ppm = snapshot.value;

        let absolute = if ppm > 2.0 * t.chemical_warn_ppm {
            Some(Severity::Critical)
        } else if ppm > t.chemical_warn_ppm {
            Some(Severity::High)
        } else {
            None
        };

        let severity = grade(absolute, snapshot, false, &self.severity)?;

        Some(threat(
            &self.machine_id,
            metrics::CHEMICAL_PPM,
            ThreatKind::ChemicalLeak,
            ppm,
            t.chemical_warn_ppm,
            snapshot,
            severity,
            format!("Chemical concentration {ppm:.1} ppm above {:.1} ppm exposure threshold",
                t.chemical_warn_ppm
            ),
        ))
    }

    fn check_airflow(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let flow = snapshot.value;

        let absolute = if flow < 0.5 * t.airflow_floor_mps {
            Some(Severity::Critical)
        } else if flow < t.airflow_floor_mps {
            Some(Severity::High)
        } else {
            None
        };

        let severity = grade(absolute, snapshot, false, &self.severity)?;

        Some(threat(
            &self.machine_id,
            metrics::AIRFLOW,
            ThreatKind::AirflowFailure,
            flow,
            t.airflow_floor_mps,
            snapshot,
            severity,
            format!(
                "FFU airflow {flow:.2} m/s below laminar floor {:.2} m/s",
                t.airflow_floor_mps
            ),
        ))
    }
}
