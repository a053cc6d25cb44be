//! Plant Configuration - All detection thresholds as operator-tunable TOML values
//!
//! Every threshold the detectors and the Safety Circuit consult is a field in
//! this module. Each struct implements `Default` with values matching the
//! constants in [`defaults`](super::defaults), so behavior is identical when
//! no config file is present.
//!
//! Thresholds are loaded once at startup and are read-only for the life of
//! the process; reconfiguration requires a restart.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::types::{AgentType, Protocol};

// ============================================================================
// Errors
// ============================================================================

/// Configuration failures are fatal at startup: a decision engine with a
/// broken threshold table must not come up in a half-armed state.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one edge deployment.
///
/// Load with `PlantConfig::load()` which searches:
/// 1. `$VIGIL_CONFIG` env var
/// 2. `./plant_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlantConfig {
    /// Site identification
    #[serde(default)]
    pub plant: PlantInfo,

    /// Rolling-window statistics tuning
    #[serde(default)]
    pub window: WindowConfig,

    /// Z-score severity bands
    #[serde(default)]
    pub severity: SeverityConfig,

    /// Safety Circuit debounce and actuation bounds
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Action executor retry policy
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Per-agent-type detection thresholds
    #[serde(default)]
    pub thresholds: ThresholdTables,

    /// Machine → agent bindings
    #[serde(default)]
    pub machines: Vec<MachineBinding>,
}

/// Site identity block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantInfo {
    pub site_id: String,
    pub description: String,
}

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            site_id: "PLANT-01".to_string(),
            description: String::new(),
        }
    }
}

/// One machine → agent-type binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineBinding {
    pub machine_id: String,
    pub agent_type: AgentType,
    /// Defaults to the conventional protocol for the agent type.
    #[serde(default)]
    pub protocol: Option<Protocol>,
}

impl MachineBinding {
    pub fn protocol(&self) -> Protocol {
        self.protocol
            .unwrap_or_else(|| Protocol::default_for(self.agent_type))
    }
}

// ============================================================================
// Window
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Ring capacity per (machine, metric)
    pub capacity: usize,
    /// Warm-up sample count below which no anomaly is reported
    pub warmup_samples: usize,
    /// Relative std floor to avoid divide-by-zero
    pub min_std_floor: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::WINDOW_CAPACITY,
            warmup_samples: defaults::WARMUP_SAMPLES,
            min_std_floor: defaults::MIN_STD_FLOOR,
        }
    }
}

// ============================================================================
// Severity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    /// Yellow band threshold (standard deviations)
    pub warning_z: f64,
    /// Red band threshold (standard deviations)
    pub critical_z: f64,
    /// Debounce-bypass threshold (standard deviations)
    pub emergency_z: f64,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            warning_z: defaults::WARNING_Z,
            critical_z: defaults::CRITICAL_Z,
            emergency_z: defaults::EMERGENCY_Z,
        }
    }
}

// ============================================================================
// Safety Circuit
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive observations required to confirm a zone transition
    pub debounce_cycles: u32,
    /// Minimum seconds between Green-tier auto adjustments
    pub green_cooldown_secs: u64,
    /// Cap on Green-tier parameter adjustments (% of current value)
    pub max_adjust_percent: f64,
    /// Yellow-tier speed reduction for mechanical threats (%)
    pub reduce_speed_mechanical_percent: u8,
    /// Yellow-tier speed reduction for thermal threats (%)
    pub reduce_speed_thermal_percent: u8,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            debounce_cycles: defaults::DEBOUNCE_CYCLES,
            green_cooldown_secs: defaults::GREEN_COOLDOWN_SECS,
            max_adjust_percent: defaults::MAX_ADJUST_PERCENT,
            reduce_speed_mechanical_percent: defaults::REDUCE_SPEED_MECHANICAL_PERCENT,
            reduce_speed_thermal_percent: defaults::REDUCE_SPEED_THERMAL_PERCENT,
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum submit attempts per action
    pub max_attempts: u32,
    /// Fixed inter-attempt delay (ms)
    pub retry_delay_ms: u64,
    /// Upper bound on random jitter added to the delay (ms); zero disables
    pub retry_jitter_ms: u64,
    /// Per-attempt bridge round-trip deadline (ms)
    pub submit_timeout_ms: u64,
    /// Shutdown grace period for in-flight executions (ms)
    pub shutdown_grace_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::EXEC_MAX_ATTEMPTS,
            retry_delay_ms: defaults::EXEC_RETRY_DELAY_MS,
            retry_jitter_ms: defaults::EXEC_RETRY_JITTER_MS,
            submit_timeout_ms: defaults::EXEC_SUBMIT_TIMEOUT_MS,
            shutdown_grace_ms: defaults::SHUTDOWN_GRACE_MS,
        }
    }
}

// ============================================================================
// Detection Threshold Tables
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThresholdTables {
    #[serde(default)]
    pub precision: PrecisionThresholds,
    #[serde(default)]
    pub facility: FacilityThresholds,
    #[serde(default)]
    pub assembly: AssemblyThresholds,
}

/// CNC machining thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionThresholds {
    /// Vibration severity bands (mm/s RMS, ISO 10816-flavored)
    pub vibration_warn_mm_s: f64,
    pub vibration_crit_mm_s: f64,
    pub vibration_emergency_mm_s: f64,
    /// Spindle temperature bands (°C)
    pub temp_warn_c: f64,
    pub temp_crit_c: f64,
    pub temp_emergency_c: f64,
    /// Temperature rate-of-change limit (°C/min)
    pub temp_roc_limit_c_min: f64,
    /// Reference temperature for thermal expansion (°C)
    pub reference_temp_c: f64,
    /// Coefficient of thermal expansion (1/°C, steel structure)
    pub cte_per_c: f64,
    /// Spindle-to-part structural span (mm)
    pub spindle_span_mm: f64,
    /// Maximum allowable thermal drift (mm)
    pub drift_max_mm: f64,
    /// Spindle load warning bound (% of rated)
    pub load_warn_percent: f64,
}

impl Default for PrecisionThresholds {
    fn default() -> Self {
        Self {
            vibration_warn_mm_s: 0.02,
            vibration_crit_mm_s: 0.05,
            vibration_emergency_mm_s: 0.08,
            temp_warn_c: 80.0,
            temp_crit_c: 95.0,
            temp_emergency_c: 105.0,
            temp_roc_limit_c_min: 5.0,
            reference_temp_c: 20.0,
            cte_per_c: 11.7e-6,
            spindle_span_mm: 500.0,
            drift_max_mm: 0.05,
            load_warn_percent: 90.0,
        }
    }
}

/// Cleanroom / facility thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityThresholds {
    /// ISO 14644-1 cleanliness class (limit derived for 0.5 µm particles)
    pub iso_class: u32,
    /// Fraction of the class limit at which a warning is raised
    pub particle_warn_fraction: f64,
    /// Filter pressure-drop bands (Pa)
    pub pressure_drop_warn_pa: f64,
    pub pressure_drop_crit_pa: f64,
    /// Chemical exposure threshold (ppm); critical at 2x
    pub chemical_warn_ppm: f64,
    /// Laminar airflow floor (m/s)
    pub airflow_floor_mps: f64,
}

impl FacilityThresholds {
    /// 0.5 µm particle concentration limit for the configured ISO class
    /// (particles/m³), from the ISO 14644-1 class equation
    /// `Cn = 10^N * (0.1/D)^2.08`.
    pub fn particle_limit(&self) -> f64 {
        10f64.powi(self.iso_class as i32) * (0.1f64 / 0.5f64).powf(2.08)
    }
}

impl Default for FacilityThresholds {
    fn default() -> Self {
        Self {
            iso_class: 5,
            particle_warn_fraction: 0.8,
            pressure_drop_warn_pa: 250.0,
            pressure_drop_crit_pa: 400.0,
            chemical_warn_ppm: 10.0,
            airflow_floor_mps: 0.35,
        }
    }
}

/// Wire bonding / packaging thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyThresholds {
    /// Minimum ultrasonic transducer impedance (Ω); readings below this are
    /// the non-stick signature
    pub impedance_floor_ohms: f64,
    /// Consecutive below-floor readings before a non-stick threat is raised
    pub nonstick_consecutive: u32,
    /// Bond-site temperature bands (°C)
    pub bond_temp_warn_c: f64,
    pub bond_temp_crit_c: f64,
    /// Cycle time ceiling (ms)
    pub cycle_time_max_ms: f64,
}

impl Default for AssemblyThresholds {
    fn default() -> Self {
        Self {
            impedance_floor_ohms: 30.0,
            nonstick_consecutive: 3,
            bond_temp_warn_c: 230.0,
            bond_temp_crit_c: 245.0,
            cycle_time_max_ms: 200.0,
        }
    }
}

// ============================================================================
// Loading & Validation
// ============================================================================

impl PlantConfig {
    /// Load configuration using the standard search order:
    /// 1. `$VIGIL_CONFIG` environment variable
    /// 2. `./plant_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("VIGIL_CONFIG") {
            info!(path = %path, "Loading config from $VIGIL_CONFIG");
            return Self::load_from_file(Path::new(&path));
        }

        let local = Path::new("plant_config.toml");
        if local.exists() {
            info!("Loading config from ./plant_config.toml");
            return Self::load_from_file(local);
        }

        warn!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check the threshold tables.
    ///
    /// Invalid tables are a fatal startup error, the one class of error
    /// this system does not recover from at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems: Vec<String> = Vec::new();

        if self.window.capacity < 2 {
            problems.push(format!(
                "window.capacity must be >= 2, got {}",
                self.window.capacity
            ));
        }
        if self.window.warmup_samples < 2 || self.window.warmup_samples > self.window.capacity {
            problems.push(format!(
                "window.warmup_samples must be in 2..=capacity ({}), got {}",
                self.window.capacity, self.window.warmup_samples
            ));
        }
        if self.window.min_std_floor <= 0.0 {
            problems.push("window.min_std_floor must be > 0".to_string());
        }

        if !(self.severity.warning_z < self.severity.critical_z
            && self.severity.critical_z <= self.severity.emergency_z)
        {
            problems.push(format!(
                "severity bands must satisfy warning_z < critical_z <= emergency_z, got {} / {} / {}",
                self.severity.warning_z, self.severity.critical_z, self.severity.emergency_z
            ));
        }

        if self.circuit.debounce_cycles == 0 {
            problems.push("circuit.debounce_cycles must be >= 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.circuit.max_adjust_percent) {
            problems.push(format!(
                "circuit.max_adjust_percent must be in 0..=100, got {}",
                self.circuit.max_adjust_percent
            ));
        }

        if self.executor.max_attempts == 0 {
            problems.push("executor.max_attempts must be >= 1".to_string());
        }

        let p = &self.thresholds.precision;
        if !(p.vibration_warn_mm_s < p.vibration_crit_mm_s
            && p.vibration_crit_mm_s < p.vibration_emergency_mm_s)
        {
            problems.push("precision vibration bands must be strictly increasing".to_string());
        }
        if !(p.temp_warn_c < p.temp_crit_c && p.temp_crit_c < p.temp_emergency_c) {
            problems.push("precision temperature bands must be strictly increasing".to_string());
        }
        if p.drift_max_mm <= 0.0 {
            problems.push("precision.drift_max_mm must be > 0".to_string());
        }

        let f = &self.thresholds.facility;
        if f.iso_class == 0 || f.iso_class > 9 {
            problems.push(format!(
                "facility.iso_class must be in 1..=9, got {}",
                f.iso_class
            ));
        }
        if !(0.0..1.0).contains(&f.particle_warn_fraction) {
            problems.push("facility.particle_warn_fraction must be in 0..1".to_string());
        }
        if f.pressure_drop_warn_pa >= f.pressure_drop_crit_pa {
            problems.push("facility pressure-drop bands must be increasing".to_string());
        }

        let a = &self.thresholds.assembly;
        if a.impedance_floor_ohms <= 0.0 {
            problems.push("assembly.impedance_floor_ohms must be > 0".to_string());
        }
        if a.nonstick_consecutive == 0 {
            problems.push("assembly.nonstick_consecutive must be >= 1".to_string());
        }
        if a.bond_temp_warn_c >= a.bond_temp_crit_c {
            problems.push("assembly bond temperature bands must be increasing".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for binding in &self.machines {
            if !seen.insert(binding.machine_id.as_str()) {
                problems.push(format!(
                    "duplicate machine binding: {}",
                    binding.machine_id
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        PlantConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn test_iso_class_5_particle_limit() {
        let f = FacilityThresholds::default();
        // ISO 5 at 0.5 um is ~3520 particles/m3
        let limit = f.particle_limit();
        assert!((limit - 3520.0).abs() < 5.0, "limit was {limit}");
    }

    #[test]
    fn test_invalid_bands_rejected() {
        let mut config = PlantConfig::default();
        config.severity.warning_z = 5.0; // above critical
        assert!(config.validate().is_err());

        let mut config = PlantConfig::default();
        config.thresholds.precision.vibration_crit_mm_s = 0.01; // below warn
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
[plant]
site_id = "FAB-EAST"
description = "east fab pilot line"

[circuit]
debounce_cycles = 5
green_cooldown_secs = 60
max_adjust_percent = 10.0
reduce_speed_mechanical_percent = 20
reduce_speed_thermal_percent = 50

[[machines]]
machine_id = "CNC-001"
agent_type = "precision"

[[machines]]
machine_id = "BOND-01"
agent_type = "assembly"
protocol = "secs-gem"
"#
        )
        .expect("write");

        let config = PlantConfig::load_from_file(file.path()).expect("load");
        assert_eq!(config.plant.site_id, "FAB-EAST");
        assert_eq!(config.circuit.debounce_cycles, 5);
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.machines[0].protocol(), Protocol::MotionControl);
        assert_eq!(config.machines[1].protocol(), Protocol::SecsGem);
        // Untouched sections fall back to defaults
        assert_eq!(config.window.capacity, defaults::WINDOW_CAPACITY);
    }

    #[test]
    fn test_duplicate_machine_rejected() {
        let mut config = PlantConfig::default();
        for _ in 0..2 {
            config.machines.push(MachineBinding {
                machine_id: "CNC-001".to_string(),
                agent_type: AgentType::Precision,
                protocol: None,
            });
        }
        assert!(config.validate().is_err());
    }
}
