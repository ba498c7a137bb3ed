//! Parameter specifications and sampled parameter sets

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SamplingError;

/// Probability distribution of one varied input.
///
/// Bounds live inside the variants that have them, so a spec can never carry
/// bounds its distribution ignores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Distribution {
    Normal {
        mean: f64,
        std_dev: f64,
    },
    Uniform {
        min: f64,
        max: f64,
    },
    /// Normal restricted to `[min, max]` by rejection resampling.
    TruncatedNormal {
        mean: f64,
        std_dev: f64,
        min: f64,
        max: f64,
    },
    /// Log-normal with `mu` and `sigma` of the underlying normal.
    LogNormal {
        mu: f64,
        sigma: f64,
    },
    Triangular {
        min: f64,
        max: f64,
        mode: f64,
    },
}

impl Distribution {
    /// Short name used in error messages and exports
    pub fn label(&self) -> &'static str {
        match self {
            Distribution::Normal { .. } => "normal",
            Distribution::Uniform { .. } => "uniform",
            Distribution::TruncatedNormal { .. } => "truncated normal",
            Distribution::LogNormal { .. } => "log-normal",
            Distribution::Triangular { .. } => "triangular",
        }
    }

    /// Support bounds, if the distribution is bounded
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Distribution::Normal { .. } | Distribution::LogNormal { .. } => None,
            Distribution::Uniform { min, max }
            | Distribution::TruncatedNormal { min, max, .. }
            | Distribution::Triangular { min, max, .. } => Some((*min, *max)),
        }
    }

    /// Representative central value: the mean, midpoint or mode.
    pub fn nominal(&self) -> f64 {
        match self {
            Distribution::Normal { mean, .. } => *mean,
            Distribution::Uniform { min, max } => 0.5 * (min + max),
            Distribution::TruncatedNormal { mean, min, max, .. } => mean.clamp(*min, *max),
            Distribution::LogNormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
            Distribution::Triangular { mode, .. } => *mode,
        }
    }
}

/// One varied simulator input and the distribution it is drawn from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub distribution: Distribution,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, distribution: Distribution) -> Self {
        Self {
            name: name.into(),
            distribution,
        }
    }

    pub fn normal(name: impl Into<String>, mean: f64, std_dev: f64) -> Self {
        Self::new(name, Distribution::Normal { mean, std_dev })
    }

    pub fn uniform(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(name, Distribution::Uniform { min, max })
    }

    pub fn truncated_normal(
        name: impl Into<String>,
        mean: f64,
        std_dev: f64,
        min: f64,
        max: f64,
    ) -> Self {
        Self::new(
            name,
            Distribution::TruncatedNormal {
                mean,
                std_dev,
                min,
                max,
            },
        )
    }

    pub fn log_normal(name: impl Into<String>, mu: f64, sigma: f64) -> Self {
        Self::new(name, Distribution::LogNormal { mu, sigma })
    }

    pub fn triangular(name: impl Into<String>, min: f64, max: f64, mode: f64) -> Self {
        Self::new(name, Distribution::Triangular { min, max, mode })
    }

    pub fn nominal(&self) -> f64 {
        self.distribution.nominal()
    }

    /// Check the distribution parameters without drawing anything.
    pub fn validate(&self) -> Result<(), SamplingError> {
        let invalid = |reason: &str| SamplingError::InvalidParameters {
            parameter: self.name.clone(),
            distribution: self.distribution.label(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("parameter name is empty"));
        }

        match self.distribution {
            Distribution::Normal { mean, std_dev } => {
                if !mean.is_finite() {
                    return Err(invalid("mean must be finite"));
                }
                if !(std_dev.is_finite() && std_dev > 0.0) {
                    return Err(invalid("std_dev must be positive and finite"));
                }
            }
            Distribution::Uniform { min, max } => {
                check_window(min, max).map_err(|r| invalid(r))?;
            }
            Distribution::TruncatedNormal {
                mean,
                std_dev,
                min,
                max,
            } => {
                if !mean.is_finite() {
                    return Err(invalid("mean must be finite"));
                }
                if !(std_dev.is_finite() && std_dev > 0.0) {
                    return Err(invalid("std_dev must be positive and finite"));
                }
                check_window(min, max).map_err(|r| invalid(r))?;
            }
            Distribution::LogNormal { mu, sigma } => {
                if !mu.is_finite() {
                    return Err(invalid("mu must be finite"));
                }
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(invalid("sigma must be positive and finite"));
                }
            }
            Distribution::Triangular { min, max, mode } => {
                check_window(min, max).map_err(|r| invalid(r))?;
                if !(min..=max).contains(&mode) {
                    return Err(invalid("mode must lie within [min, max]"));
                }
            }
        }
        Ok(())
    }
}

fn check_window(min: f64, max: f64) -> Result<(), &'static str> {
    if !(min.is_finite() && max.is_finite()) {
        return Err("bounds must be finite");
    }
    if min >= max {
        return Err("min must be strictly less than max");
    }
    Ok(())
}

/// Sampled values for one trial, in the order of their `ParameterSpec`s.
///
/// Names are shared across every set of a run, so cloning a set copies only
/// its values. Sets are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameterSet")]
pub struct ParameterSet {
    names: Arc<[String]>,
    values: Vec<f64>,
}

/// Unchecked wire form of a [`ParameterSet`]
#[derive(Deserialize)]
struct RawParameterSet {
    names: Vec<String>,
    values: Vec<f64>,
}

impl TryFrom<RawParameterSet> for ParameterSet {
    type Error = String;

    fn try_from(raw: RawParameterSet) -> Result<Self, Self::Error> {
        let (names, values) = (raw.names.len(), raw.values.len());
        Self::new(raw.names.into(), raw.values)
            .ok_or_else(|| format!("parameter set has {names} names but {values} values"))
    }
}

impl ParameterSet {
    /// Build a set from shared names and matching values.
    ///
    /// Returns `None` if the lengths differ.
    pub fn new(names: Arc<[String]>, values: Vec<f64>) -> Option<Self> {
        (names.len() == values.len()).then_some(Self { names, values })
    }

    /// Caller guarantees one value per name.
    pub(crate) fn from_shared(names: Arc<[String]>, values: Vec<f64>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// Build a set from `(name, value)` pairs, keeping their order.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<f64>) =
            pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self {
            names: names.into(),
            values,
        }
    }

    /// The nominal point of a list of specs
    pub fn nominal(specs: &[ParameterSpec]) -> Self {
        Self::from_pairs(specs.iter().map(|s| (s.name.clone(), s.nominal())))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i).copied())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn shared_names(&self) -> &Arc<[String]> {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// A copy of this set with one parameter replaced.
    ///
    /// Returns `None` if the parameter is not part of the set.
    #[must_use]
    pub fn with_value(&self, name: &str, value: f64) -> Option<Self> {
        let idx = self.names.iter().position(|n| n == name)?;
        let mut values = self.values.clone();
        *values.get_mut(idx)? = value;
        Some(Self {
            names: Arc::clone(&self.names),
            values,
        })
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(n, v)| (n.to_string(), v)).collect()
    }
}
