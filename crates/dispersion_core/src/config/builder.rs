//! Study Builder
//!
//! The StudyBuilder provides a fluent API for assembling a `StudyConfig`
//! in code, with validation deferred to `build()`.
//!
//! # Example
//!
//! ```ignore
//! use dispersion_core::config::StudyBuilder;
//! use dispersion_core::model::ParameterSpec;
//!
//! let config = StudyBuilder::new()
//!     .parameter(ParameterSpec::normal("motor_thrust", 1700.0, 35.0))
//!     .parameter(ParameterSpec::truncated_normal("dry_mass", 16.0, 0.2, 15.5, 16.5))
//!     .parameter(ParameterSpec::uniform("wind_speed", 0.0, 8.0))
//!     .trials(2_000)
//!     .seed(7)
//!     .max_workers(8)
//!     .trial_timeout_secs(20.0)
//!     .significance_margin(2.0)
//!     .build()?;
//! ```

use super::{EnsembleConfig, OatConfig, StudyConfig};
use crate::analysis::VarianceAnalysisConfig;
use crate::error::ConfigError;
use crate::model::ParameterSpec;

/// Builder for study configurations
#[derive(Debug, Clone, Default)]
pub struct StudyBuilder {
    parameters: Vec<ParameterSpec>,
    ensemble: EnsembleConfig,
    analysis: VarianceAnalysisConfig,
    oat: OatConfig,
}

impl StudyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Add a varied parameter
    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn parameters(mut self, specs: impl IntoIterator<Item = ParameterSpec>) -> Self {
        self.parameters.extend(specs);
        self
    }

    // =========================================================================
    // Ensemble execution
    // =========================================================================

    pub fn trials(mut self, trials: usize) -> Self {
        self.ensemble.trials = trials;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.ensemble.seed = seed;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.ensemble.max_workers = workers;
        self
    }

    pub fn trial_timeout_secs(mut self, secs: f64) -> Self {
        self.ensemble.trial_timeout_secs = Some(secs);
        self
    }

    pub fn deadline_secs(mut self, secs: f64) -> Self {
        self.ensemble.deadline_secs = Some(secs);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.ensemble.batch_size = size;
        self
    }

    pub fn failure_rate_warning(mut self, rate: f64) -> Self {
        self.ensemble.failure_rate_warning = rate;
        self
    }

    pub fn abort_failure_rate(mut self, rate: f64) -> Self {
        self.ensemble.abort_failure_rate = Some(rate);
        self
    }

    pub fn percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.ensemble.percentiles = percentiles;
        self
    }

    pub fn max_sampling_retries(mut self, retries: usize) -> Self {
        self.ensemble.max_sampling_retries = retries;
        self
    }

    // =========================================================================
    // Variance analysis
    // =========================================================================

    pub fn significance_margin(mut self, margin_pct: f64) -> Self {
        self.analysis.significance_margin = margin_pct;
        self
    }

    /// Bootstrap replicate count and interval coverage
    pub fn bootstrap(mut self, replicates: usize, confidence_level: f64) -> Self {
        self.analysis.bootstrap_replicates = replicates;
        self.analysis.confidence_level = confidence_level;
        self
    }

    pub fn bootstrap_seed(mut self, seed: u64) -> Self {
        self.analysis.bootstrap_seed = seed;
        self
    }

    pub fn vif_threshold(mut self, threshold: f64) -> Self {
        self.analysis.vif_threshold = threshold;
        self
    }

    /// LAE thresholds (percent) for fair and poor fits
    pub fn lae_thresholds(mut self, fair_pct: f64, poor_pct: f64) -> Self {
        self.analysis.lae_fair_pct = fair_pct;
        self.analysis.lae_poor_pct = poor_pct;
        self
    }

    /// Leave a parameter out of the variance fit; it is still sampled
    pub fn exclude(mut self, parameter: impl Into<String>) -> Self {
        self.analysis.excluded_parameters.push(parameter.into());
        self
    }

    /// Analyze only this target (may be called repeatedly)
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.analysis.targets.push(target.into());
        self
    }

    // =========================================================================
    // One-at-a-time analysis
    // =========================================================================

    pub fn perturbation_fraction(mut self, fraction: f64) -> Self {
        self.oat.perturbation_fraction = fraction;
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Validate and produce the configuration
    pub fn build(self) -> Result<StudyConfig, ConfigError> {
        let config = StudyConfig {
            parameters: self.parameters,
            ensemble: self.ensemble,
            analysis: self.analysis,
            oat: self.oat,
        };
        config.validate()?;
        Ok(config)
    }
}
