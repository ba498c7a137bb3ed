//! Configuration of the variance-based sensitivity analysis.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Tuning knobs of [`super::VarianceAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceAnalysisConfig {
    /// Percentage points a sensitivity must exceed the LAE by to be significant
    pub significance_margin: f64,
    /// Bootstrap resamples per analysis; zero disables confidence intervals
    pub bootstrap_replicates: usize,
    /// Coverage of the bootstrap percentile intervals
    pub confidence_level: f64,
    pub bootstrap_seed: u64,
    /// Variance inflation factor above which a parameter is flagged
    pub vif_threshold: f64,
    /// LAE (percent) above which the linear fit is only fair
    pub lae_fair_pct: f64,
    /// LAE (percent) above which the linear fit is poor
    pub lae_poor_pct: f64,
    /// Smallest correlation eigenvalue, relative to the largest, before the
    /// parameters are treated as collinear
    pub rank_tolerance: f64,
    /// Allowed gap between decomposition R² and OLS R² before warning
    pub correlated_inputs_tolerance: f64,
    /// Parameters dropped from the design before fitting
    pub excluded_parameters: Vec<String>,
    /// Targets to analyze, in report order; empty means every target
    pub targets: Vec<String>,
}

impl Default for VarianceAnalysisConfig {
    fn default() -> Self {
        Self {
            significance_margin: 1.0,
            bootstrap_replicates: 200,
            confidence_level: 0.95,
            bootstrap_seed: 0,
            vif_threshold: 10.0,
            lae_fair_pct: 10.0,
            lae_poor_pct: 20.0,
            rank_tolerance: 1e-10,
            correlated_inputs_tolerance: 0.1,
            excluded_parameters: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl VarianceAnalysisConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let check = |ok: bool, msg: String| {
            if ok {
                Ok(())
            } else {
                Err(AnalysisError::InvalidConfig(msg))
            }
        };

        check(
            self.significance_margin.is_finite() && self.significance_margin >= 0.0,
            format!(
                "significance_margin must be non-negative, got {}",
                self.significance_margin
            ),
        )?;
        check(
            self.confidence_level > 0.0 && self.confidence_level < 1.0,
            format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            ),
        )?;
        check(
            self.vif_threshold.is_finite() && self.vif_threshold >= 1.0,
            format!("vif_threshold must be at least 1, got {}", self.vif_threshold),
        )?;
        check(
            self.lae_fair_pct > 0.0 && self.lae_fair_pct <= self.lae_poor_pct && self.lae_poor_pct <= 100.0,
            format!(
                "LAE thresholds must satisfy 0 < fair ({}) <= poor ({}) <= 100",
                self.lae_fair_pct, self.lae_poor_pct
            ),
        )?;
        check(
            self.rank_tolerance > 0.0 && self.rank_tolerance < 1.0,
            format!("rank_tolerance must be in (0, 1), got {}", self.rank_tolerance),
        )?;
        check(
            self.correlated_inputs_tolerance.is_finite() && self.correlated_inputs_tolerance >= 0.0,
            format!(
                "correlated_inputs_tolerance must be non-negative, got {}",
                self.correlated_inputs_tolerance
            ),
        )
    }
}
