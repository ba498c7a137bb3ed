//! Study configuration
//!
//! A `StudyConfig` holds everything needed to run a dispersion study: the
//! varied parameters, how the ensemble is executed, and how the variance and
//! one-at-a-time analyses are tuned. Every section has defaults, so a YAML
//! file only needs to name the parameters.
//!
//! # Builder DSL
//!
//! ```ignore
//! use dispersion_core::config::StudyBuilder;
//! use dispersion_core::model::ParameterSpec;
//!
//! let config = StudyBuilder::new()
//!     .parameter(ParameterSpec::normal("thrust_scale", 1.0, 0.05))
//!     .parameter(ParameterSpec::uniform("launch_angle_deg", 84.0, 86.0))
//!     .trials(1_000)
//!     .seed(42)
//!     .trial_timeout_secs(30.0)
//!     .bootstrap(200, 0.95)
//!     .build()?;
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::VarianceAnalysisConfig;
use crate::error::ConfigError;
use crate::model::ParameterSpec;
use crate::sampling::{DEFAULT_MAX_RETRIES, ParameterSampler};
use crate::stats::{DEFAULT_PERCENTILES, validate_percentiles};

pub mod builder;

pub use builder::StudyBuilder;

pub(crate) fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// How an ensemble of trials is sampled and executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Number of trials to sample
    pub trials: usize,
    /// Seed of the parameter sampler
    pub seed: u64,
    /// Upper bound on concurrent simulator calls
    pub max_workers: usize,
    /// Per-trial wall-clock limit; a trial exceeding it is recorded as a timeout
    pub trial_timeout_secs: Option<f64>,
    /// Ensemble wall-clock limit; trials not yet dispatched are recorded as failures
    pub deadline_secs: Option<f64>,
    /// Number of index-ordered results handed to a sink at once
    pub batch_size: usize,
    /// Failure rate above which the run carries a warning
    pub failure_rate_warning: f64,
    /// Failure rate above which the run is aborted
    pub abort_failure_rate: Option<f64>,
    /// Percentiles (fractions) reported in ensemble summaries
    pub percentiles: Vec<f64>,
    /// Rejected draws allowed per truncated-normal value
    pub max_sampling_retries: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            trials: 1_000,
            seed: 0,
            max_workers: default_max_workers(),
            trial_timeout_secs: None,
            deadline_secs: None,
            batch_size: 64,
            failure_rate_warning: 0.2,
            abort_failure_rate: None,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            max_sampling_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.trials == 0 {
            return invalid("ensemble.trials must be at least 1".into());
        }
        if self.max_workers == 0 {
            return invalid("ensemble.max_workers must be at least 1".into());
        }
        if self.batch_size == 0 {
            return invalid("ensemble.batch_size must be at least 1".into());
        }
        if self.max_sampling_retries == 0 {
            return invalid("ensemble.max_sampling_retries must be at least 1".into());
        }
        for (field, value) in [
            ("trial_timeout_secs", self.trial_timeout_secs),
            ("deadline_secs", self.deadline_secs),
        ] {
            if let Some(secs) = value
                && !(secs.is_finite() && secs > 0.0)
            {
                return invalid(format!("ensemble.{field} must be positive, got {secs}"));
            }
        }
        if !(0.0..=1.0).contains(&self.failure_rate_warning) {
            return invalid(format!(
                "ensemble.failure_rate_warning must be in [0, 1], got {}",
                self.failure_rate_warning
            ));
        }
        if let Some(rate) = self.abort_failure_rate
            && !(rate > 0.0 && rate <= 1.0)
        {
            return invalid(format!(
                "ensemble.abort_failure_rate must be in (0, 1], got {rate}"
            ));
        }
        validate_percentiles(&self.percentiles).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Workers actually spawned for `trials` trials
    pub fn worker_count(&self, trials: usize) -> usize {
        self.max_workers.clamp(1, trials.max(1))
    }

    pub fn trial_timeout(&self) -> Option<Duration> {
        self.trial_timeout_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }
}

/// Tuning of the one-at-a-time analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OatConfig {
    /// Relative perturbation applied to each nominal value
    pub perturbation_fraction: f64,
}

impl Default for OatConfig {
    fn default() -> Self {
        Self {
            perturbation_fraction: 0.05,
        }
    }
}

/// Complete configuration of a dispersion study
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub parameters: Vec<ParameterSpec>,
    pub ensemble: EnsembleConfig,
    pub analysis: VarianceAnalysisConfig,
    pub oat: OatConfig,
}

impl StudyConfig {
    /// Parse and validate a YAML study description
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: StudyConfig =
            serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Yaml(e.to_string()))
    }

    /// Check every section, and that excluded parameters are actually varied
    pub fn validate(&self) -> Result<(), ConfigError> {
        ParameterSampler::validate(&self.parameters)?;
        self.ensemble.validate()?;
        self.analysis
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let f = self.oat.perturbation_fraction;
        if !(f.is_finite() && f > 0.0 && f < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "oat.perturbation_fraction must be in (0, 1), got {f}"
            )));
        }

        if let Some(unknown) = self
            .analysis
            .excluded_parameters
            .iter()
            .find(|name| !self.parameters.iter().any(|p| &p.name == *name))
        {
            return Err(ConfigError::Invalid(format!(
                "analysis.excluded_parameters names unknown parameter `{unknown}`"
            )));
        }
        Ok(())
    }
}
