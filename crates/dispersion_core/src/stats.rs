//! Ensemble aggregation and shared descriptive statistics

use std::collections::BTreeMap;

use crate::error::EnsembleError;
use crate::model::{EnsembleSummary, FailureReason, MetricStats, TrialResult, failure_breakdown};

/// Percentiles reported when none are configured
pub const DEFAULT_PERCENTILES: [f64; 5] = [0.05, 0.25, 0.5, 0.75, 0.95];

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with an `n - 1` denominator; zero below two values
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Standard deviation with an `n` denominator
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Percentile `p` (a fraction) of an ascending slice.
///
/// Interpolates linearly between the two closest ranks.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

impl MetricStats {
    /// Compute statistics of a non-empty set of values
    pub fn from_values(mut values: Vec<f64>, percentiles: &[f64]) -> Self {
        values.sort_by(f64::total_cmp);
        let percentile_values = percentiles
            .iter()
            .map(|&p| (p, percentile_sorted(&values, p)))
            .collect();

        Self {
            count: values.len(),
            mean: mean(&values),
            std_dev: sample_std_dev(&values),
            min: values.first().copied().unwrap_or(f64::NAN),
            max: values.last().copied().unwrap_or(f64::NAN),
            percentile_values,
        }
    }
}

pub fn validate_percentiles(percentiles: &[f64]) -> Result<(), EnsembleError> {
    match percentiles
        .iter()
        .find(|p| !(p.is_finite() && (0.0..=1.0).contains(*p)))
    {
        Some(p) => Err(EnsembleError::InvalidConfig(format!(
            "percentile {p} must be a fraction in [0, 1]"
        ))),
        None => Ok(()),
    }
}

/// Share of dispatched trials that failed in the simulator.
///
/// Trials that were never dispatched are not simulator failures and are left
/// out of both sides of the ratio.
pub fn simulated_failure_rate(failures: &BTreeMap<FailureReason, usize>, dispatched: usize) -> f64 {
    if dispatched == 0 {
        return 0.0;
    }
    let simulated: usize = failures
        .iter()
        .filter(|(reason, _)| **reason != FailureReason::NotDispatched)
        .map(|(_, count)| count)
        .sum();
    simulated as f64 / dispatched as f64
}

/// Aggregate the successful trials of an ensemble.
///
/// Failures are excluded from every statistic and counted separately. An
/// ensemble with no successes cannot be summarized.
pub fn summarize(
    results: &[TrialResult],
    percentiles: &[f64],
) -> Result<EnsembleSummary, EnsembleError> {
    validate_percentiles(percentiles)?;

    let failures_by_reason = failure_breakdown(results);
    let num_failures: usize = failures_by_reason.values().sum();
    let num_successes = results.len() - num_failures;
    let not_dispatched = failures_by_reason
        .get(&FailureReason::NotDispatched)
        .copied()
        .unwrap_or(0);

    if num_successes == 0 {
        return Err(EnsembleError::EnsembleFailed {
            trials: results.len(),
            failures: failures_by_reason,
        });
    }

    let columns = results
        .iter()
        .filter_map(TrialResult::outputs)
        .flat_map(|outputs| outputs.iter())
        .fold(BTreeMap::<&str, Vec<f64>>::new(), |mut acc, (name, value)| {
            acc.entry(name.as_str()).or_default().push(*value);
            acc
        });

    let metrics = columns
        .into_iter()
        .map(|(name, values)| (name.to_string(), MetricStats::from_values(values, percentiles)))
        .collect();

    Ok(EnsembleSummary {
        num_trials: results.len(),
        num_successes,
        num_failures,
        failure_rate: simulated_failure_rate(&failures_by_reason, results.len() - not_dispatched),
        failures_by_reason,
        metrics,
    })
}
