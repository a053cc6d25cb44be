//! Telemetry transport schema and per-sample error taxonomy

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One inbound telemetry message from the transport boundary
///
/// A frame carries a set of domain-specific metric readings taken at the same
/// instant. `BTreeMap` keeps per-frame metric order deterministic so a frame
/// always replays identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub machine_id: String,
    pub metrics: BTreeMap<String, f64>,
    /// Acquisition time (epoch seconds)
    pub timestamp: u64,
}

impl TelemetryFrame {
    /// Fan the frame out into per-metric samples, preserving metric order.
    pub fn samples(&self) -> impl Iterator<Item = TelemetrySample> + '_ {
        self.metrics.iter().map(|(metric, value)| TelemetrySample {
            machine_id: self.machine_id.clone(),
            metric: metric.clone(),
            value: *value,
            timestamp: self.timestamp,
        })
    }
}

/// A single scalar reading; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub machine_id: String,
    pub metric: String,
    pub value: f64,
    pub timestamp: u64,
}

/// Per-sample rejection reasons
///
/// All variants are recovered locally: the sample is dropped, the pipeline
/// continues. None of these are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("non-finite value for metric {metric}")]
    NonFinite { metric: String },

    #[error("non-monotonic timestamp for metric {metric}: last {last}, got {got}")]
    NonMonotonicTimestamp { metric: String, last: u64, got: u64 },

    #[error("duplicate timestamp {timestamp} for metric {metric}")]
    DuplicateTimestamp { metric: String, timestamp: u64 },
}
