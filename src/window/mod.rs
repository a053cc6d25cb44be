//! Telemetry Window - Rolling Statistics & Rate-of-Change
//!
//! One `MetricWindow` exists per (machine, metric) pairing and is owned
//! exclusively by that machine's pipeline worker. It maintains a bounded ring
//! of recent samples with incrementally updated mean/variance (Welford-style
//! updates, with an eviction correction when the ring is full) and a
//! first-difference rate-of-change estimate.
//!
//! ## Baseline semantics
//!
//! The snapshot returned by [`ingest`](MetricWindow::ingest) reports the
//! statistics of the window *before* the new sample is absorbed: the z-score
//! measures the new reading against the learned baseline, then the reading
//! joins the baseline. A reading is never compared against statistics it has
//! already shifted.
//!
//! ## Warm-up
//!
//! Until `warmup_samples` readings have been ingested the snapshot carries
//! `insufficient_data = true`. Callers must treat this as "no threat", not
//! "no anomaly".

use std::collections::VecDeque;

use crate::types::{TelemetryError, TelemetrySample};

/// Statistics snapshot produced by one ingest call
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    /// The reading that produced this snapshot
    pub value: f64,
    /// Baseline mean (window state before this reading)
    pub mean: f64,
    /// Baseline standard deviation, floored to avoid divide-by-zero
    pub std_dev: f64,
    /// Standard deviations of `value` from the baseline
    pub z_score: f64,
    /// First difference of the metric (units/min); 0.0 for the first sample
    pub rate_of_change: f64,
    /// Samples in the window after this reading was absorbed
    pub sample_count: usize,
    /// True while fewer than the warm-up threshold of samples were ingested
    pub insufficient_data: bool,
}

/// Bounded rolling window for one (machine, metric) pairing
#[derive(Debug, Clone)]
pub struct MetricWindow {
    metric: String,
    capacity: usize,
    warmup_samples: usize,
    min_std_floor: f64,
    values: VecDeque<f64>,
    /// Running mean over `values`
    mean: f64,
    /// Running sum of squared deviations over `values`
    m2: f64,
    last_value: Option<f64>,
    last_timestamp: Option<u64>,
}

impl MetricWindow {
    pub fn new(metric: &str, capacity: usize, warmup_samples: usize, min_std_floor: f64) -> Self {
        Self {
            metric: metric.to_string(),
            capacity: capacity.max(2),
            warmup_samples,
            min_std_floor,
            values: VecDeque::with_capacity(capacity.max(2)),
            mean: 0.0,
            m2: 0.0,
            last_value: None,
            last_timestamp: None,
        }
    }

    /// Build a window from the global plant configuration.
    pub fn from_config(metric: &str, window: &crate::config::WindowConfig) -> Self {
        Self::new(
            metric,
            window.capacity,
            window.warmup_samples,
            window.min_std_floor,
        )
    }

    /// Absorb one sample and return the statistics snapshot.
    ///
    /// Rejected samples (`NonFinite`, `DuplicateTimestamp`,
    /// `NonMonotonicTimestamp`) leave the window state untouched, so
    /// re-delivery of a frame is idempotent.
    pub fn ingest(&mut self, sample: &TelemetrySample) -> Result<WindowSnapshot, TelemetryError> {
        if !sample.value.is_finite() {
            return Err(TelemetryError::NonFinite {
                metric: self.metric.clone(),
            });
        }

        if let Some(last) = self.last_timestamp {
            if sample.timestamp == last {
                return Err(TelemetryError::DuplicateTimestamp {
                    metric: self.metric.clone(),
                    timestamp: sample.timestamp,
                });
            }
            if sample.timestamp < last {
                return Err(TelemetryError::NonMonotonicTimestamp {
                    metric: self.metric.clone(),
                    last,
                    got: sample.timestamp,
                });
            }
        }

        // Rate of change in units/min. The timestamp checks above guarantee a
        // strictly positive delta here.
        let rate_of_change = match (self.last_value, self.last_timestamp) {
            (Some(prev_value), Some(prev_ts)) => {
                let dt_secs = (sample.timestamp - prev_ts) as f64;
                (sample.value - prev_value) / dt_secs * 60.0
            }
            _ => 0.0,
        };

        // Baseline statistics before the new sample joins the window.
        let baseline_mean = if self.values.is_empty() {
            sample.value
        } else {
            self.mean
        };
        let baseline_std = self.effective_std();
        let z_score = if self.values.is_empty() {
            0.0
        } else {
            (sample.value - baseline_mean) / baseline_std
        };

        self.absorb(sample.value);
        self.last_value = Some(sample.value);
        self.last_timestamp = Some(sample.timestamp);

        Ok(WindowSnapshot {
            value: sample.value,
            mean: baseline_mean,
            std_dev: baseline_std,
            z_score,
            rate_of_change,
            sample_count: self.values.len(),
            insufficient_data: self.values.len() < self.warmup_samples,
        })
    }

    /// Push a value, evicting the oldest sample first when the ring is full.
    fn absorb(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            if let Some(oldest) = self.values.pop_front() {
                let n = self.values.len() + 1;
                if n == 1 {
                    self.mean = 0.0;
                    self.m2 = 0.0;
                } else {
                    let old_mean = self.mean;
                    self.mean = (n as f64 * old_mean - oldest) / (n - 1) as f64;
                    self.m2 -= (oldest - old_mean) * (oldest - self.mean);
                    // Floating-point cancellation can leave a tiny negative
                    // residue; variance must stay non-negative.
                    self.m2 = self.m2.max(0.0);
                }
            }
        }

        self.values.push_back(value);
        let count = self.values.len();
        let delta = value - self.mean;
        self.mean += delta / count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Sample variance of the current window.
    pub fn variance(&self) -> f64 {
        if self.values.len() < 2 {
            0.0
        } else {
            self.m2 / (self.values.len() - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard deviation with a floor so a flat signal cannot produce an
    /// infinite z-score.
    pub fn effective_std(&self) -> f64 {
        let floor = (self.mean.abs() * self.min_std_floor).max(self.min_std_floor);
        self.std_dev().max(floor)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sample_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_warmed_up(&self) -> bool {
        self.values.len() >= self.warmup_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64, timestamp: u64) -> TelemetrySample {
        TelemetrySample {
            machine_id: "CNC-001".to_string(),
            metric: "spindle_temp".to_string(),
            value,
            timestamp,
        }
    }

    fn window(capacity: usize, warmup: usize) -> MetricWindow {
        MetricWindow::new("spindle_temp", capacity, warmup, 0.001)
    }

    /// Reference oracle: closed-form sample mean/std over a slice.
    fn closed_form(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var.sqrt())
    }

    #[test]
    fn test_incremental_stats_match_oracle() {
        let mut w = window(100, 5);
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        for (i, v) in values.iter().enumerate() {
            w.ingest(&sample(*v, i as u64 + 1)).expect("ingest");
        }
        let (mean, std) = closed_form(&values);
        assert!((w.mean() - mean).abs() < 1e-9);
        assert!((w.std_dev() - std).abs() < 1e-9);
    }

    #[test]
    fn test_eviction_keeps_stats_exact() {
        let mut w = window(10, 5);
        let mut all: Vec<f64> = Vec::new();
        for i in 0..50u64 {
            // Noisy ramp exercises both accumulate and evict paths
            let v = 20.0 + (i as f64 * 0.37) + if i % 3 == 0 { 1.5 } else { -0.5 };
            all.push(v);
            w.ingest(&sample(v, i + 1)).expect("ingest");
        }
        let tail: Vec<f64> = all[all.len() - 10..].to_vec();
        let (mean, std) = closed_form(&tail);
        assert_eq!(w.sample_count(), 10);
        assert!((w.mean() - mean).abs() < 1e-6, "mean drifted after eviction");
        assert!((w.std_dev() - std).abs() < 1e-6, "std drifted after eviction");
    }

    #[test]
    fn test_warmup_gating() {
        let mut w = window(100, 20);
        for i in 0..19u64 {
            let snap = w.ingest(&sample(75.0 + (i % 2) as f64, i + 1)).expect("ingest");
            assert!(snap.insufficient_data, "sample {} should be warm-up", i + 1);
        }
        let snap = w.ingest(&sample(75.0, 20)).expect("ingest");
        assert!(!snap.insufficient_data, "20th sample completes warm-up");
    }

    #[test]
    fn test_duplicate_timestamp_is_idempotent() {
        let mut w = window(100, 5);
        for i in 0..10u64 {
            w.ingest(&sample(70.0 + i as f64, i + 1)).expect("ingest");
        }
        let mean_before = w.mean();
        let count_before = w.sample_count();

        let err = w.ingest(&sample(79.0, 10)).expect_err("duplicate rejected");
        assert!(matches!(err, TelemetryError::DuplicateTimestamp { .. }));
        assert_eq!(w.sample_count(), count_before);
        assert!((w.mean() - mean_before).abs() < 1e-12);
    }

    #[test]
    fn test_non_monotonic_timestamp_rejected() {
        let mut w = window(100, 5);
        w.ingest(&sample(70.0, 100)).expect("ingest");
        let err = w.ingest(&sample(71.0, 50)).expect_err("stale rejected");
        assert!(matches!(
            err,
            TelemetryError::NonMonotonicTimestamp { last: 100, got: 50, .. }
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut w = window(100, 5);
        assert!(matches!(
            w.ingest(&sample(f64::NAN, 1)),
            Err(TelemetryError::NonFinite { .. })
        ));
        assert!(matches!(
            w.ingest(&sample(f64::INFINITY, 2)),
            Err(TelemetryError::NonFinite { .. })
        ));
        assert_eq!(w.sample_count(), 0);
    }

    #[test]
    fn test_rate_of_change_per_minute() {
        let mut w = window(100, 2);
        w.ingest(&sample(70.0, 60)).expect("ingest");
        // +2 degrees over 30 seconds = +4/min
        let snap = w.ingest(&sample(72.0, 90)).expect("ingest");
        assert!((snap.rate_of_change - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_uses_floor() {
        let mut w = window(100, 2);
        for i in 0..30u64 {
            w.ingest(&sample(50.0, i + 1)).expect("ingest");
        }
        let snap = w.ingest(&sample(50.5, 31)).expect("ingest");
        assert!(snap.z_score.is_finite());
        assert!(snap.std_dev > 0.0);
    }

    #[test]
    fn test_z_score_against_baseline() {
        // Seed a baseline of mean 75, std ~2, then probe with 85.
        let mut w = window(200, 20);
        for i in 0..100u64 {
            let v = if i % 2 == 0 { 73.0 } else { 77.0 };
            w.ingest(&sample(v, i + 1)).expect("ingest");
        }
        assert!((w.mean() - 75.0).abs() < 1e-9);

        let snap = w.ingest(&sample(85.0, 101)).expect("ingest");
        // Sample std of the +/-2 alternation is slightly above 2.0
        assert!(
            (snap.z_score - 5.0).abs() < 0.1,
            "z was {}",
            snap.z_score
        );
        assert!(!snap.insufficient_data);
    }
}
