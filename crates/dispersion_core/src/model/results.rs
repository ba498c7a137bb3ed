//! Aggregated ensemble statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::trial::FailureReason;

/// Summary statistics of one output metric over the successful trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Number of successful trials that reported this metric
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); zero for a single value
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// `(percentile, value)` pairs with percentiles as fractions in `[0, 1]`
    pub percentile_values: Vec<(f64, f64)>,
}

impl MetricStats {
    /// Look up a stored percentile (fraction) within a small tolerance
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentile_values
            .iter()
            .find(|(q, _)| (q - p).abs() < 1e-9)
            .map(|(_, v)| *v)
    }
}

/// Aggregate view of an ensemble run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    pub num_trials: usize,
    pub num_successes: usize,
    pub num_failures: usize,
    /// Simulator failures over dispatched trials; undispatched trials excluded
    pub failure_rate: f64,
    pub failures_by_reason: BTreeMap<FailureReason, usize>,
    pub metrics: BTreeMap<String, MetricStats>,
}

impl EnsembleSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricStats> {
        self.metrics.get(name)
    }
}

/// Non-fatal conditions observed during an ensemble run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnsembleWarning {
    /// Failure rate above the configured warning threshold
    HighFailureRate {
        rate: f64,
        threshold: f64,
        failures_by_reason: BTreeMap<FailureReason, usize>,
    },
    /// The ensemble deadline stopped dispatch before all trials ran
    DeadlineReached { dispatched: usize, total: usize },
    /// The run was cancelled before all trials ran
    Cancelled { dispatched: usize, total: usize },
}
