//! System-wide default constants.
//!
//! Centralises magic numbers so every tunable has exactly one authoritative
//! default. Grouped by subsystem for easy discovery. Each value can be
//! overridden per deployment in `plant_config.toml`.

// ============================================================================
// Telemetry Window
// ============================================================================

/// Rolling window capacity per (machine, metric), in samples.
pub const WINDOW_CAPACITY: usize = 100;

/// Samples required before window statistics are considered reliable.
///
/// Below this count the detector treats the metric as "no threat",
/// not "no anomaly".
pub const WARMUP_SAMPLES: usize = 20;

/// Minimum standard deviation floor (relative to |mean|, with an absolute
/// floor) to avoid divide-by-zero on flat signals.
pub const MIN_STD_FLOOR: f64 = 0.001;

// ============================================================================
// Severity Mapping
// ============================================================================

/// Z-score at which a reading enters the Yellow band.
pub const WARNING_Z: f64 = 2.0;

/// Z-score at which a reading enters the Red band.
pub const CRITICAL_Z: f64 = 3.0;

/// Z-score that bypasses debounce and forces Red immediately.
///
/// Models a catastrophic spike that cannot wait out the debounce window.
pub const EMERGENCY_Z: f64 = 4.0;

// ============================================================================
// Safety Circuit
// ============================================================================

/// Consecutive cycles a zone must be observed before the circuit acts on it.
pub const DEBOUNCE_CYCLES: u32 = 3;

/// Minimum seconds between Green-tier auto-adjust decisions per machine.
pub const GREEN_COOLDOWN_SECS: u64 = 60;

/// Largest allowed magnitude for a Green-tier parameter adjustment,
/// as a percentage of the current value.
pub const MAX_ADJUST_PERCENT: f64 = 10.0;

/// Speed reduction proposed for mechanical Yellow-tier threats (%).
pub const REDUCE_SPEED_MECHANICAL_PERCENT: u8 = 20;

/// Speed reduction proposed for thermal Yellow-tier threats (%).
pub const REDUCE_SPEED_THERMAL_PERCENT: u8 = 50;

// ============================================================================
// Action Executor
// ============================================================================

/// Maximum submit attempts per action.
pub const EXEC_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between submit attempts (ms).
pub const EXEC_RETRY_DELAY_MS: u64 = 1_000;

/// Upper bound on random jitter added to the retry delay (ms). Zero disables.
pub const EXEC_RETRY_JITTER_MS: u64 = 250;

/// Per-attempt bridge round-trip deadline (ms).
pub const EXEC_SUBMIT_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Pipeline
// ============================================================================

/// Per-machine worker inbox capacity (messages).
///
/// Bounded so a slow worker applies backpressure to the dispatcher instead
/// of buffering unboundedly.
pub const WORKER_CHANNEL_CAPACITY: usize = 256;

/// Grace period for in-flight executions to finish on shutdown (ms).
pub const SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Emit a routing progress log every N frames.
pub const ROUTE_PROGRESS_INTERVAL: u64 = 100;
