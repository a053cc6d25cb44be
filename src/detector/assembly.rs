//! Assembly detector - wire bonding and packaging equipment
//!
//! The primary signal is ultrasonic transducer impedance: when a bond forms,
//! the wire couples to the pad and the mechanical impedance rises. Readings
//! that stay below the floor mean the wire never stuck (non-stick on pad).
//! One low reading can be a measurement artifact, so a threat is raised only
//! after a consecutive run of below-floor readings.

use crate::config::{AssemblyThresholds, SeverityConfig};
use crate::types::{Severity, Threat, ThreatKind};
use crate::window::WindowSnapshot;

use super::{derived_warning_threshold, grade, metrics, threat};

pub struct AssemblyDetector {
    machine_id: String,
    thresholds: AssemblyThresholds,
    severity: SeverityConfig,
    /// Consecutive below-floor impedance readings
    nonstick_run: u32,
}

impl AssemblyDetector {
    pub fn new(machine_id: &str, thresholds: AssemblyThresholds, severity: SeverityConfig) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            thresholds,
            severity,
            nonstick_run: 0,
        }
    }

    pub fn analyze(&mut self, metric: &str, snapshot: &WindowSnapshot) -> Vec<Threat> {
        let found = match metric {
            metrics::USG_IMPEDANCE => self.check_nonstick(snapshot),
            metrics::BOND_TEMP => self.check_bond_temp(snapshot),
            metrics::CYCLE_TIME => self.check_cycle_time(snapshot),
            _ => None,
        };
        found.into_iter().collect()
    }

    fn check_nonstick(&mut self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;

        if snapshot.value >= t.impedance_floor_ohms {
            self.nonstick_run = 0;
            return None;
        }

        self.nonstick_run += 1;
        if self.nonstick_run < t.nonstick_consecutive {
            return None;
        }
        self.nonstick_run = 0;

        Some(threat(
            &self.machine_id,
            metrics::USG_IMPEDANCE,
            ThreatKind::BondNonStick,
            snapshot.value,
            t.impedance_floor_ohms,
            snapshot,
            Severity::High,
            format!(
                "Non-stick signature: {} consecutive bonds below {:.0} Ω",
                t.nonstick_consecutive, t.impedance_floor_ohms
            ),
        ))
    }

    fn check_bond_temp(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let temp = snapshot.value;

        let absolute = if temp >= t.bond_temp_crit_c {
            Some(Severity::High)
        } else if temp >= t.bond_temp_warn_c {
            Some(Severity::Medium)
        } else {
            None
        };

        let severity = grade(absolute, snapshot, false, &self.severity)?;
        let threshold = if absolute.is_some() {
            t.bond_temp_warn_c
        } else {
            derived_warning_threshold(snapshot, &self.severity)
        };

        Some(threat(
            &self.machine_id,
            metrics::BOND_TEMP,
            ThreatKind::BondOverheat,
            temp,
            threshold,
            snapshot,
            severity,
            format!("Bond-site temperature {temp:.1}°C out of band"),
        ))
    }

    fn check_cycle_time(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let cycle = snapshot.value;

        let absolute = (cycle > t.cycle_time_max_ms).then_some(Severity::Medium);
        let severity = grade(absolute, snapshot, false, &self.severity)?;
        let threshold = if absolute.is_some() {
            t.cycle_time_max_ms
        } else {
            derived_warning_threshold(snapshot, &self.severity)
        };

        Some(threat(
            &self.machine_id,
            metrics::CYCLE_TIME,
            ThreatKind::CycleTimeDrift,
            cycle,
            threshold,
            snapshot,
            severity,
            format!(
                "Bond cycle time {cycle:.0} ms above {:.0} ms ceiling",
                t.cycle_time_max_ms
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AssemblyDetector {
        AssemblyDetector::new(
            "BOND-01",
            AssemblyThresholds::default(),
            SeverityConfig::default(),
        )
    }

    fn snap(value: f64, mean: f64, std_dev: f64) -> WindowSnapshot {
        WindowSnapshot {
            value,
            mean,
            std_dev,
            z_score: (value - mean) / std_dev,
            rate_of_change: 0.0,
            sample_count: 50,
            insufficient_data: false,
        }
    }

    #[test]
    fn test_nonstick_requires_consecutive_run() {
        let mut d = detector();

        // Two low readings, then a good bond: run resets, no threat
        assert!(d.analyze(metrics::USG_IMPEDANCE, &snap(20.0, 80.0, 10.0)).is_empty());
        assert!(d.analyze(metrics::USG_IMPEDANCE, &snap(22.0, 80.0, 10.0)).is_empty());
        assert!(d.analyze(metrics::USG_IMPEDANCE, &snap(85.0, 80.0, 10.0)).is_empty());

        // Three consecutive low readings trigger exactly one threat
        assert!(d.analyze(metrics::USG_IMPEDANCE, &snap(20.0, 80.0, 10.0)).is_empty());
        assert!(d.analyze(metrics::USG_IMPEDANCE, &snap(21.0, 80.0, 10.0)).is_empty());
        let threats = d.analyze(metrics::USG_IMPEDANCE, &snap(19.0, 80.0, 10.0));
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].kind, ThreatKind::BondNonStick);
        assert_eq!(threats[0].severity, Severity::High);

        // Counter reset after detection: next low reading starts a new run
        assert!(d.analyze(metrics::USG_IMPEDANCE, &snap(20.0, 80.0, 10.0)).is_empty());
    }

    #[test]
    fn test_bond_temp_bands() {
        let mut d = detector();
        assert!(d.analyze(metrics::BOND_TEMP, &snap(210.0, 208.0, 5.0)).is_empty());

        let threats = d.analyze(metrics::BOND_TEMP, &snap(233.0, 228.0, 5.0));
        assert_eq!(threats[0].severity, Severity::Medium);

        let threats = d.analyze(metrics::BOND_TEMP, &snap(250.0, 228.0, 5.0));
        // Absolute High plus z Critical: max wins
        assert_eq!(threats[0].severity, Severity::Critical);
    }

    #[test]
    fn test_cycle_time_ceiling() {
        let mut d = detector();
        let threats = d.analyze(metrics::CYCLE_TIME, &snap(215.0, 212.0, 10.0));
        assert_eq!(threats[0].kind, ThreatKind::CycleTimeDrift);
        assert_eq!(threats[0].severity, Severity::Medium);
    }
}
