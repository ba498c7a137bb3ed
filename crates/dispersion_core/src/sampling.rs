//! Seeded parameter sampling
//!
//! Every parameter draws from its own ChaCha stream, addressed by the run seed
//! and the parameter's ordinal. Appending a parameter or growing the sample
//! count never changes draws that were already produced.

use std::sync::Arc;

use rand::SeedableRng;
use rand::distr::{Distribution as _, Uniform};
use rand_chacha::ChaCha8Rng;
use rand_distr::{LogNormal, Normal, Triangular};
use rustc_hash::FxHashSet;

use crate::error::SamplingError;
use crate::model::{Distribution, ParameterSet, ParameterSpec};

/// Default number of rejected draws allowed per truncated-normal value
pub const DEFAULT_MAX_RETRIES: usize = 10_000;

/// Deterministic generator for stream `stream` of `seed`
pub fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// A validated distribution, ready to draw from
#[derive(Debug, Clone)]
enum CompiledDistribution {
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
    Truncated {
        normal: Normal<f64>,
        min: f64,
        max: f64,
    },
    LogNormal(LogNormal<f64>),
    Triangular(Triangular<f64>),
}

impl CompiledDistribution {
    fn compile(spec: &ParameterSpec) -> Result<Self, SamplingError> {
        spec.validate()?;

        let invalid = |reason: String| SamplingError::InvalidParameters {
            parameter: spec.name.clone(),
            distribution: spec.distribution.label(),
            reason,
        };

        match spec.distribution {
            Distribution::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map(CompiledDistribution::Normal)
                .map_err(|e| invalid(e.to_string())),
            Distribution::Uniform { min, max } => Uniform::new_inclusive(min, max)
                .map(CompiledDistribution::Uniform)
                .map_err(|e| invalid(e.to_string())),
            Distribution::TruncatedNormal {
                mean,
                std_dev,
                min,
                max,
            } => Normal::new(mean, std_dev)
                .map(|normal| CompiledDistribution::Truncated { normal, min, max })
                .map_err(|e| invalid(e.to_string())),
            Distribution::LogNormal { mu, sigma } => LogNormal::new(mu, sigma)
                .map(CompiledDistribution::LogNormal)
                .map_err(|e| invalid(e.to_string())),
            Distribution::Triangular { min, max, mode } => Triangular::new(min, max, mode)
                .map(CompiledDistribution::Triangular)
                .map_err(|e| invalid(e.to_string())),
        }
    }

    fn draw(
        &self,
        rng: &mut ChaCha8Rng,
        parameter: &str,
        max_retries: usize,
    ) -> Result<f64, SamplingError> {
        match self {
            CompiledDistribution::Normal(d) => Ok(d.sample(rng)),
            CompiledDistribution::Uniform(d) => Ok(d.sample(rng)),
            CompiledDistribution::LogNormal(d) => Ok(d.sample(rng)),
            CompiledDistribution::Triangular(d) => Ok(d.sample(rng)),
            // Rejection resampling; values are never clipped onto the bounds
            CompiledDistribution::Truncated { normal, min, max } => {
                for _ in 0..max_retries.max(1) {
                    let x = normal.sample(rng);
                    if (*min..=*max).contains(&x) {
                        return Ok(x);
                    }
                }
                Err(SamplingError::TruncationBudgetExceeded {
                    parameter: parameter.to_string(),
                    attempts: max_retries.max(1),
                    min: *min,
                    max: *max,
                })
            }
        }
    }
}

/// Draws parameter sets from a list of specs.
///
/// The sampler holds only the run seed; generator state is created per
/// parameter stream on each call, so a sampler can be shared freely.
#[derive(Debug, Clone)]
pub struct ParameterSampler {
    seed: u64,
    max_retries: usize,
}

impl ParameterSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the truncated-normal retry budget
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Validate every spec and reject duplicate names
    pub fn validate(specs: &[ParameterSpec]) -> Result<(), SamplingError> {
        if specs.is_empty() {
            return Err(SamplingError::NoParameters);
        }
        let mut seen = FxHashSet::default();
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(SamplingError::DuplicateParameter(spec.name.clone()));
            }
            spec.validate()?;
        }
        Ok(())
    }

    /// Draw `n` values of the parameter at position `ordinal`
    pub fn sample_column(
        &self,
        ordinal: usize,
        spec: &ParameterSpec,
        n: usize,
    ) -> Result<Vec<f64>, SamplingError> {
        let dist = CompiledDistribution::compile(spec)?;
        let mut rng = stream_rng(self.seed, ordinal as u64);
        (0..n)
            .map(|_| dist.draw(&mut rng, &spec.name, self.max_retries))
            .collect()
    }

    /// Draw `n` parameter sets, one per trial
    pub fn sample(
        &self,
        specs: &[ParameterSpec],
        n: usize,
    ) -> Result<Vec<ParameterSet>, SamplingError> {
        Self::validate(specs)?;

        let columns = specs
            .iter()
            .enumerate()
            .map(|(ordinal, spec)| self.sample_column(ordinal, spec, n))
            .collect::<Result<Vec<_>, _>>()?;

        let names: Arc<[String]> = specs.iter().map(|s| s.name.clone()).collect();
        Ok((0..n)
            .map(|row| {
                let values = columns.iter().map(|col| col[row]).collect();
                ParameterSet::from_shared(Arc::clone(&names), values)
            })
            .collect())
    }
}

/// Draw `n` parameter sets from `specs` with the given seed
pub fn sample(
    specs: &[ParameterSpec],
    n: usize,
    seed: u64,
) -> Result<Vec<ParameterSet>, SamplingError> {
    ParameterSampler::new(seed).sample(specs, n)
}
