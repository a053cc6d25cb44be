//! Precision detector - CNC machining centers, mills, lathes
//!
//! Watches spindle vibration (chatter / bearing wear), spindle temperature
//! (thermal runaway plus expansion drift), and spindle load (tool overload).
//!
//! Thermal drift uses the linear expansion model `ΔL = α · L · ΔT` over the
//! spindle-to-part span, so a temperature rise converts directly into a
//! positional error the machine cannot see on its own encoders.

use crate::config::{PrecisionThresholds, SeverityConfig};
use crate::types::{Severity, Threat, ThreatKind};
use crate::window::WindowSnapshot;

use super::{derived_warning_threshold, grade, metrics, threat};

pub struct PrecisionDetector {
    machine_id: String,
    thresholds: PrecisionThresholds,
    severity: SeverityConfig,
}

impl PrecisionDetector {
    pub fn new(machine_id: &str, thresholds: PrecisionThresholds, severity: SeverityConfig) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            thresholds,
            severity,
        }
    }

    pub fn analyze(&self, metric: &str, snapshot: &WindowSnapshot) -> Vec<Threat> {
        match metric {
            metrics::SPINDLE_VIBRATION => self.check_vibration(snapshot).into_iter().collect(),
            metrics::SPINDLE_TEMP => {
                let mut threats = Vec::new();
                if let Some(t) = self.check_thermal_runaway(snapshot) {
                    threats.push(t);
                }
                if let Some(t) = self.check_thermal_drift(snapshot) {
                    threats.push(t);
                }
                threats
            }
            metrics::SPINDLE_LOAD => self.check_tool_load(snapshot).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn check_vibration(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let v = snapshot.value;

        let absolute = if v >= t.vibration_emergency_mm_s {
            Some(Severity::Critical)
        } else if v >= t.vibration_crit_mm_s {
            Some(Severity::High)
        } else if v >= t.vibration_warn_mm_s {
            Some(Severity::Medium)
        } else {
            None
        };

        let severity = grade(absolute, snapshot, false, &self.severity)?;
        let threshold = if absolute.is_some() {
            t.vibration_warn_mm_s
        } else {
            derived_warning_threshold(snapshot, &self.severity)
        };

        Some(threat(
            &self.machine_id,
            metrics::SPINDLE_VIBRATION,
            ThreatKind::SpindleVibration,
            v,
            threshold,
            snapshot,
            severity,
            format!(
                "Abnormal spindle vibration {:.4} mm/s (baseline {:.4} mm/s)",
                v, snapshot.mean
            ),
        ))
    }

    fn check_thermal_runaway(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let temp = snapshot.value;

        let absolute = if temp >= t.temp_emergency_c {
            Some(Severity::Critical)
        } else if temp >= t.temp_crit_c {
            Some(Severity::High)
        } else if temp >= t.temp_warn_c {
            Some(Severity::Medium)
        } else {
            None
        };

        let roc_breached = snapshot.rate_of_change > t.temp_roc_limit_c_min;
        let severity = grade(absolute, snapshot, roc_breached, &self.severity)?;
        let threshold = if absolute.is_some() {
            t.temp_warn_c
        } else {
            derived_warning_threshold(snapshot, &self.severity)
        };

        Some(threat(
            &self.machine_id,
            metrics::SPINDLE_TEMP,
            ThreatKind::ThermalRunaway,
            temp,
            threshold,
            snapshot,
            severity,
            format!(
                "Spindle temperature {temp:.1}°C (RoC {:.1}°C/min)",
                snapshot.rate_of_change
            ),
        ))
    }

    fn check_thermal_drift(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let temp_rise = snapshot.value - t.reference_temp_c;
        let drift_mm = t.cte_per_c * t.spindle_span_mm * temp_rise;

        if drift_mm.abs() <= t.drift_max_mm {
            return None;
        }

        let severity = if drift_mm.abs() > 2.0 * t.drift_max_mm {
            Severity::Critical
        } else {
            Severity::High
        };

        Some(threat(
            &self.machine_id,
            metrics::SPINDLE_TEMP,
            ThreatKind::ThermalDrift,
            drift_mm,
            t.drift_max_mm,
            snapshot,
            severity,
            format!("Thermal drift {drift_mm:.3} mm on Z axis exceeds {:.3} mm", t.drift_max_mm),
        ))
    }

    fn check_tool_load(&self, snapshot: &WindowSnapshot) -> Option<Threat> {
        let t = &self.thresholds;
        let load = snapshot.value;

        let absolute = (load >= t.load_warn_percent).then_some(Severity::Medium);
        let severity = grade(absolute, snapshot, false, &self.severity)?;
        let threshold = if absolute.is_some() {
            t.load_warn_percent
        } else {
            derived_warning_threshold(snapshot, &self.severity)
        };

        Some(threat(
            &self.machine_id,
            metrics::SPINDLE_LOAD,
            ThreatKind::ToolOverload,
            load,
            threshold,
            snapshot,
            severity,
            format!(
                "Spindle load {load:.1}% above cutting baseline {:.1}%",
                snapshot.mean
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> PrecisionDetector {
        PrecisionDetector::new(
            "CNC-001",
            PrecisionThresholds::default(),
            SeverityConfig::default(),
        )
    }

    fn snap(value: f64, mean: f64, std_dev: f64, roc: f64) -> WindowSnapshot {
        WindowSnapshot {
            value,
            mean,
            std_dev,
            z_score: (value - mean) / std_dev,
            rate_of_change: roc,
            sample_count: 50,
            insufficient_data: false,
        }
    }

    #[test]
    fn test_quiet_spindle_produces_nothing() {
        let d = detector();
        let threats = d.analyze(metrics::SPINDLE_VIBRATION, &snap(0.005, 0.005, 0.001, 0.0));
        assert!(threats.is_empty());
    }

    #[test]
    fn test_vibration_bands() {
        let d = detector();

        let threats = d.analyze(metrics::SPINDLE_VIBRATION, &snap(0.03, 0.028, 0.02, 0.0));
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].kind, ThreatKind::SpindleVibration);
        assert_eq!(threats[0].severity, Severity::Medium);

        let threats = d.analyze(metrics::SPINDLE_VIBRATION, &snap(0.09, 0.03, 0.05, 0.0));
        assert_eq!(threats[0].severity, Severity::Critical);
    }

    #[test]
    fn test_thermal_runaway_roc_escalation() {
        let d = detector();

        // Warm band only: Medium
        let threats = d.analyze(metrics::SPINDLE_TEMP, &snap(82.0, 81.0, 2.0, 1.0));
        let runaway = threats
            .iter()
            .find(|t| t.kind == ThreatKind::ThermalRunaway)
            .expect("runaway threat");
        assert_eq!(runaway.severity, Severity::Medium);

        // Same band but climbing fast: escalates to High
        let threats = d.analyze(metrics::SPINDLE_TEMP, &snap(82.0, 81.0, 2.0, 8.0));
        let runaway = threats
            .iter()
            .find(|t| t.kind == ThreatKind::ThermalRunaway)
            .expect("runaway threat");
        assert_eq!(runaway.severity, Severity::High);
    }

    #[test]
    fn test_thermal_drift_from_expansion_model() {
        let d = detector();
        // 30°C rise: 11.7e-6 * 500 * 30 = 0.1755 mm, over 2x the 0.05 limit
        let threats = d.analyze(metrics::SPINDLE_TEMP, &snap(50.0, 49.0, 2.0, 0.0));
        let drift = threats
            .iter()
            .find(|t| t.kind == ThreatKind::ThermalDrift)
            .expect("drift threat");
        assert!((drift.detected_value - 0.1755).abs() < 1e-4);
        assert_eq!(drift.severity, Severity::Critical);
    }

    #[test]
    fn test_pure_z_detection_uses_derived_threshold() {
        let d = detector();
        // Value inside absolute bands but 2.5 sigma off baseline
        let threats = d.analyze(metrics::SPINDLE_TEMP, &snap(65.0, 60.0, 2.0, 0.0));
        let runaway = threats
            .iter()
            .find(|t| t.kind == ThreatKind::ThermalRunaway)
            .expect("z-triggered threat");
        assert_eq!(runaway.severity, Severity::High);
        // threshold = mean + 2.0 * std = 64.0
        assert!((runaway.threshold_value - 64.0).abs() < 1e-9);
    }
}
