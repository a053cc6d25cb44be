//! Safety Circuit - debounced 3-tier response state machine
//!
//! One circuit instance exists per machine (not per metric). Each telemetry
//! cycle the worker feeds it the batch of threats detected for that machine;
//! the circuit tracks the machine's effective zone and decides what, if
//! anything, may be done about it:
//!
//! - **Green**: bounded parameter adjustment, auto-executed
//! - **Yellow**: speed reduction / maintenance / feed hold, queued for
//!   operator approval, never auto-executed
//! - **Red**: emergency stop raised as an alert only; resuming from Red
//!   always requires a human
//!
//! ## Debounce & hysteresis
//!
//! A transition into Yellow or Red must be observed for K consecutive cycles
//! before it is acted on: one noisy sample must not actuate equipment. The
//! single exception is a catastrophic spike (`z >= emergency_z`), which
//! cannot wait. De-escalation back to Green requires K consecutive Green
//! observations so actions do not flap around the threshold.
//!
//! The consecutive-observation counter is an explicit [`ZoneStreak`] value
//! rather than implicit control flow, so the debounce behavior is testable
//! on its own.

use tracing::{debug, info, warn};

use crate::config::CircuitConfig;
use crate::types::{
    Action, ActionStatus, DecisionOutcome, SafetyZone, Threat, ThreatKind,
};

// ============================================================================
// Zone Streak Counter
// ============================================================================

/// Counts consecutive observations of the same zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStreak {
    candidate: SafetyZone,
    count: u32,
}

impl ZoneStreak {
    pub fn new() -> Self {
        Self {
            candidate: SafetyZone::Green,
            count: 0,
        }
    }

    /// Record an observation; returns the streak length for that zone.
    pub fn observe(&mut self, zone: SafetyZone) -> u32 {
        if zone == self.candidate {
            self.count += 1;
        } else {
            self.candidate = zone;
            self.count = 1;
        }
        self.count
    }

    pub fn reset(&mut self) {
        self.candidate = SafetyZone::Green;
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Default for ZoneStreak {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Safety Circuit
// ============================================================================

/// A confirmed decision plus the threat that drove it
#[derive(Debug, Clone)]
pub struct CircuitDecision {
    pub outcome: DecisionOutcome,
    pub threat: Threat,
}

/// Per-machine safety state machine
pub struct SafetyCircuit {
    machine_id: String,
    config: CircuitConfig,
    /// Debounce-bypass z threshold
    emergency_z: f64,
    /// Current confirmed zone
    zone: SafetyZone,
    /// Consecutive observations of an escalation candidate
    escalation: ZoneStreak,
    /// Consecutive Green observations while above Green
    green_streak: u32,
    /// Timestamp of the last Green-tier auto adjustment (epoch seconds)
    last_green_action_at: Option<u64>,
}

impl SafetyCircuit {
    pub fn new(machine_id: &str, config: CircuitConfig, emergency_z: f64) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            config,
            emergency_z,
            zone: SafetyZone::Green,
            escalation: ZoneStreak::new(),
            green_streak: 0,
            last_green_action_at: None,
        }
    }

    /// Current confirmed zone for this machine.
    pub fn zone(&self) -> SafetyZone {
        self.zone
    }

    /// Feed one cycle's threat batch through the state machine.
    ///
    /// Must be called once per telemetry cycle, including quiet cycles with
    /// no threats: Green observations drive de-escalation and reset the
    /// debounce streak.
    pub fn observe(&mut self, threats: &[Threat], now_secs: u64) -> Option<CircuitDecision> {
        let observed = threats
            .iter()
            .map(|t| t.severity.zone())
            .max()
            .unwrap_or(SafetyZone::Green);
        // Ties go to the earliest threat in the batch
        let dominant = threats.iter().rev().max_by_key(|t| t.severity).cloned();

        // Catastrophic spike: straight to Red, debounce skipped.
        if threats.iter().any(|t| t.z_score.abs() >= self.emergency_z) {
            self.escalation.reset();
            self.green_streak = 0;
            if self.zone != SafetyZone::Red {
                self.zone = SafetyZone::Red;
                warn!(
                    machine = %self.machine_id,
                    "Emergency bypass: zone forced to RED"
                );
                return dominant.map(|t| self.decide(SafetyZone::Red, t));
            }
            return None;
        }

        if observed > self.zone {
            self.green_streak = 0;
            let streak = self.escalation.observe(observed);
            debug!(
                machine = %self.machine_id,
                observed = %observed,
                streak,
                needed = self.config.debounce_cycles,
                "Escalation candidate"
            );
            if streak >= self.config.debounce_cycles {
                self.escalation.reset();
                self.zone = observed;
                info!(machine = %self.machine_id, zone = %observed, "Zone transition confirmed");
                return dominant.map(|t| self.decide(observed, t));
            }
            return None;
        }

        // Observation at or below the confirmed zone clears any escalation
        // candidate.
        self.escalation.reset();

        if observed < self.zone {
            if observed == SafetyZone::Green {
                self.green_streak += 1;
                if self.green_streak >= self.config.debounce_cycles {
                    info!(
                        machine = %self.machine_id,
                        from = %self.zone,
                        "De-escalated to GREEN after sustained recovery"
                    );
                    self.zone = SafetyZone::Green;
                    self.green_streak = 0;
                }
            } else {
                // A Yellow observation under a Red zone is not recovery.
                self.green_streak = 0;
            }
            return None;
        }

        // observed == zone: any recovery run is broken
        self.green_streak = 0;
        if self.zone == SafetyZone::Green {
            if let Some(threat) = dominant {
                return self.green_correction(threat, now_secs);
            }
        }
        None
    }

    /// Green-tier bounded corrective action, rate-limited by the cooldown.
    fn green_correction(&mut self, threat: Threat, now_secs: u64) -> Option<CircuitDecision> {
        if let Some(last) = self.last_green_action_at {
            if now_secs.saturating_sub(last) < self.config.green_cooldown_secs {
                debug!(
                    machine = %self.machine_id,
                    "Green correction suppressed by cooldown"
                );
                return None;
            }
        }
        self.last_green_action_at = Some(now_secs);
        Some(self.decide(SafetyZone::Green, threat))
    }

    /// Map a confirmed zone plus its dominant threat to an action and
    /// disposition.
    fn decide(&self, zone: SafetyZone, threat: Threat) -> CircuitDecision {
        let (action, status) = match zone {
            SafetyZone::Green => (
                self.green_adjustment(&threat),
                ActionStatus::AutoExecuted,
            ),
            SafetyZone::Yellow => (self.yellow_action(&threat), ActionStatus::PendingApproval),
            SafetyZone::Red => (red_action(threat.kind), ActionStatus::AlertOnly),
        };
        CircuitDecision {
            outcome: DecisionOutcome {
                zone,
                action,
                status,
            },
            threat,
        }
    }

    /// Bounded setpoint trim for Green-tier threats.
    ///
    /// Deltas are relative percentages and are clamped to the configured
    /// safe band, so an autonomous correction can never swing a setpoint
    /// further than the operator allowed.
    fn green_adjustment(&self, threat: &Threat) -> Action {
        let (name, delta_percent) = match threat.kind {
            ThreatKind::SpindleVibration => ("spindle_rpm", -5.0),
            ThreatKind::ThermalRunaway | ThreatKind::BondOverheat => ("coolant_flow", 10.0),
            ThreatKind::ToolOverload => ("feed_rate", -5.0),
            ThreatKind::Contamination
            | ThreatKind::PressureAnomaly
            | ThreatKind::AirflowFailure => ("ffu_speed", 5.0),
            ThreatKind::CycleTimeDrift => ("bond_power", 2.0),
            // Drift, non-stick, and leaks have no safe Green-tier trim;
            // fall back to a conservative feed reduction.
            ThreatKind::ThermalDrift | ThreatKind::BondNonStick | ThreatKind::ChemicalLeak => {
                ("feed_rate", -5.0)
            }
        };
        let bound = self.config.max_adjust_percent;
        Action::AdjustParameter {
            name: name.to_string(),
            new_value: delta_percent.clamp(-bound, bound),
            unit: "percent".to_string(),
        }
    }

    fn yellow_action(&self, threat: &Threat) -> Action {
        match threat.kind {
            ThreatKind::SpindleVibration | ThreatKind::ToolOverload => Action::ReduceSpeed {
                percent: self.config.reduce_speed_mechanical_percent,
            },
            ThreatKind::ThermalRunaway | ThreatKind::BondOverheat => Action::ReduceSpeed {
                percent: self.config.reduce_speed_thermal_percent,
            },
            ThreatKind::ThermalDrift => Action::ScheduleMaintenance {
                component: "spindle".to_string(),
                urgency: "next_safe_stop".to_string(),
            },
            ThreatKind::PressureAnomaly => Action::ScheduleMaintenance {
                component: "hepa_filter".to_string(),
                urgency: "within_24h".to_string(),
            },
            ThreatKind::AirflowFailure => Action::ScheduleMaintenance {
                component: "ffu".to_string(),
                urgency: "within_24h".to_string(),
            },
            ThreatKind::CycleTimeDrift => Action::ScheduleMaintenance {
                component: "bond_head".to_string(),
                urgency: "next_safe_stop".to_string(),
            },
            ThreatKind::BondNonStick => Action::FeedHold {
                reason: "non-stick run on bond pad".to_string(),
            },
            ThreatKind::Contamination => Action::FeedHold {
                reason: "particle excursion".to_string(),
            },
            ThreatKind::ChemicalLeak => Action::FeedHold {
                reason: "chemical concentration above threshold".to_string(),
            },
        }
    }
}

/// Red-tier disposition: a stop command for machine-local failure modes,
/// alert-only for zone-level conditions a stop cannot fix.
fn red_action(kind: ThreatKind) -> Action {
    match kind {
        ThreatKind::SpindleVibration
        | ThreatKind::ThermalRunaway
        | ThreatKind::ThermalDrift
        | ThreatKind::ToolOverload
        | ThreatKind::BondNonStick
        | ThreatKind::BondOverheat => Action::EmergencyStop,
        ThreatKind::Contamination
        | ThreatKind::PressureAnomaly
        | ThreatKind::ChemicalLeak
        | ThreatKind::AirflowFailure
        | ThreatKind::CycleTimeDrift => Action::AlertOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn threat(severity: Severity, z: f64) -> Threat {
        Threat {
            machine_id: "CNC-001".to_string(),
            metric: "spindle_temp".to_string(),
            kind: ThreatKind::ThermalRunaway,
            detected_value: 85.0,
            threshold_value: 80.0,
            z_score: z,
            rate_of_change: 0.0,
            severity,
            message: "test".to_string(),
        }
    }

    fn circuit() -> SafetyCircuit {
        SafetyCircuit::new("CNC-001", CircuitConfig::default(), 4.0)
    }

    #[test]
    fn test_zone_streak_counts_and_resets() {
        let mut streak = ZoneStreak::new();
        assert_eq!(streak.observe(SafetyZone::Yellow), 1);
        assert_eq!(streak.observe(SafetyZone::Yellow), 2);
        assert_eq!(streak.observe(SafetyZone::Red), 1);
        assert_eq!(streak.observe(SafetyZone::Yellow), 1);
        streak.reset();
        assert_eq!(streak.count(), 0);
    }

    #[test]
    fn test_debounce_blocks_premature_yellow() {
        let mut c = circuit();
        // K-1 Yellow observations, then a Green one: no action
        assert!(c.observe(&[threat(Severity::High, 2.5)], 0).is_none());
        assert!(c.observe(&[threat(Severity::High, 2.5)], 1).is_none());
        assert!(c.observe(&[], 2).is_none());
        assert_eq!(c.zone(), SafetyZone::Green);

        // A fresh run of K Yellows triggers exactly one decision
        assert!(c.observe(&[threat(Severity::High, 2.5)], 3).is_none());
        assert!(c.observe(&[threat(Severity::High, 2.5)], 4).is_none());
        let decision = c.observe(&[threat(Severity::High, 2.5)], 5).expect("confirmed");
        assert_eq!(decision.outcome.zone, SafetyZone::Yellow);
        assert_eq!(decision.outcome.status, ActionStatus::PendingApproval);
        assert!(matches!(decision.outcome.action, Action::ReduceSpeed { .. }));

        // Staying Yellow does not re-emit
        assert!(c.observe(&[threat(Severity::High, 2.5)], 6).is_none());
        assert_eq!(c.zone(), SafetyZone::Yellow);
    }

    #[test]
    fn test_emergency_bypass_skips_debounce() {
        let mut c = circuit();
        let decision = c
            .observe(&[threat(Severity::Critical, 5.0)], 0)
            .expect("immediate red");
        assert_eq!(decision.outcome.zone, SafetyZone::Red);
        assert_eq!(decision.outcome.status, ActionStatus::AlertOnly);
        assert_eq!(decision.outcome.action, Action::EmergencyStop);
        assert_eq!(c.zone(), SafetyZone::Red);

        // A second spike while already Red does not re-emit
        assert!(c.observe(&[threat(Severity::Critical, 6.0)], 1).is_none());
    }

    #[test]
    fn test_red_without_emergency_z_is_debounced() {
        let mut c = circuit();
        assert!(c.observe(&[threat(Severity::Critical, 3.5)], 0).is_none());
        assert!(c.observe(&[threat(Severity::Critical, 3.5)], 1).is_none());
        let decision = c.observe(&[threat(Severity::Critical, 3.5)], 2).expect("red");
        assert_eq!(decision.outcome.zone, SafetyZone::Red);
    }

    #[test]
    fn test_deescalation_hysteresis() {
        let mut c = circuit();
        for i in 0..3 {
            c.observe(&[threat(Severity::High, 2.5)], i);
        }
        assert_eq!(c.zone(), SafetyZone::Yellow);

        // Two quiet cycles are not enough
        assert!(c.observe(&[], 10).is_none());
        assert!(c.observe(&[], 11).is_none());
        assert_eq!(c.zone(), SafetyZone::Yellow);

        // A relapse resets the recovery count
        c.observe(&[threat(Severity::High, 2.5)], 12);
        assert!(c.observe(&[], 13).is_none());
        assert!(c.observe(&[], 14).is_none());
        assert_eq!(c.zone(), SafetyZone::Yellow);

        // Third consecutive Green completes the recovery
        assert!(c.observe(&[], 15).is_none());
        assert_eq!(c.zone(), SafetyZone::Green);
    }

    #[test]
    fn test_green_correction_bounded_and_cooled_down() {
        let mut c = circuit();
        let decision = c
            .observe(&[threat(Severity::Medium, 1.5)], 100)
            .expect("green correction");
        assert_eq!(decision.outcome.zone, SafetyZone::Green);
        assert_eq!(decision.outcome.status, ActionStatus::AutoExecuted);
        match &decision.outcome.action {
            Action::AdjustParameter { new_value, unit, .. } => {
                assert!(new_value.abs() <= CircuitConfig::default().max_adjust_percent);
                assert_eq!(unit, "percent");
            }
            other => panic!("expected AdjustParameter, got {other:?}"),
        }

        // Within the cooldown window: suppressed
        assert!(c.observe(&[threat(Severity::Medium, 1.5)], 130).is_none());
        // After the cooldown: allowed again
        assert!(c.observe(&[threat(Severity::Medium, 1.5)], 161).is_some());
    }

    #[test]
    fn test_yellow_observation_does_not_recover_red() {
        let mut c = circuit();
        c.observe(&[threat(Severity::Critical, 5.0)], 0);
        assert_eq!(c.zone(), SafetyZone::Red);

        for i in 1..10 {
            assert!(c.observe(&[threat(Severity::High, 2.5)], i).is_none());
        }
        assert_eq!(c.zone(), SafetyZone::Red);
    }
}
