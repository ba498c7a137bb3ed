//! Variance-based sensitivity decomposition.

use nalgebra::DMatrix;
use rand::Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, warn};

use super::config::VarianceAnalysisConfig;
use super::regression::{self, Decomposition, LinearFit, PreparedParameters};
use crate::design::DesignMatrix;
use crate::error::AnalysisError;
use crate::model::{
    BootstrapSummary, ColumnScaling, ModelValidityWarning, SensitivityEntry, SensitivityReport,
    TargetFailure, TargetSensitivity,
};
use crate::sampling::stream_rng;
use crate::stats::percentile_sorted;

/// One target fitted on the full design
struct FullFit {
    column: usize,
    scaling: ColumnScaling,
    fit: LinearFit,
    decomposition: Decomposition,
}

/// Fits a standardized linear model per target and decomposes its variance.
#[derive(Debug, Clone, Default)]
pub struct VarianceAnalyzer {
    config: VarianceAnalysisConfig,
}

impl VarianceAnalyzer {
    pub fn new(config: VarianceAnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VarianceAnalysisConfig {
        &self.config
    }

    /// Analyze every target of `design`.
    ///
    /// A degenerate target is recorded in the report's `failures` and does
    /// not stop the others. Degenerate parameters fail every target alike.
    pub fn fit(&self, design: &DesignMatrix) -> Result<SensitivityReport, AnalysisError> {
        self.config.validate()?;
        let design = self.restrict(design)?;

        let parameter_names = design.parameter_names();
        let target_names = design.target_names();
        info!(
            rows = design.nrows(),
            parameters = parameter_names.len(),
            targets = target_names.len(),
            "fitting variance decomposition"
        );

        let prepared = match regression::prepare_parameters(
            parameter_names,
            design.parameters(),
            self.config.rank_tolerance,
        ) {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(%error, "parameter columns are degenerate; no target can be fitted");
                return Ok(SensitivityReport {
                    created_at: jiff::Timestamp::now(),
                    rows: design.nrows(),
                    parameters: parameter_names.to_vec(),
                    excluded_parameters: self.config.excluded_parameters.clone(),
                    targets: Vec::new(),
                    failures: target_names
                        .iter()
                        .map(|target| TargetFailure {
                            target: target.clone(),
                            error: error.clone(),
                        })
                        .collect(),
                });
            }
        };

        let mut fits = Vec::new();
        let mut failures = Vec::new();
        for (column, target) in target_names.iter().enumerate() {
            match regression::standardize_target(target, design.targets().column(column)) {
                Ok((scaling, y)) => {
                    let fit = regression::fit(&prepared, &y);
                    let decomposition = regression::decompose(&fit);
                    fits.push(FullFit {
                        column,
                        scaling,
                        fit,
                        decomposition,
                    });
                }
                Err(error) => {
                    warn!(output = %target, %error, "target skipped");
                    failures.push(TargetFailure {
                        target: target.clone(),
                        error,
                    });
                }
            }
        }

        let replicates = self.bootstrap(&design, &fits);
        let vif = prepared.vif();

        let targets = fits
            .iter()
            .enumerate()
            .map(|(k, full)| {
                let samples: Vec<&Vec<f64>> =
                    replicates.iter().filter_map(|r| r[k].as_ref()).collect();
                self.assemble(&design, &prepared, &vif, full, &samples)
            })
            .collect();

        Ok(SensitivityReport {
            created_at: jiff::Timestamp::now(),
            rows: design.nrows(),
            parameters: parameter_names.to_vec(),
            excluded_parameters: self.config.excluded_parameters.clone(),
            targets,
            failures,
        })
    }

    /// Apply configured parameter exclusions and target selection
    fn restrict(&self, design: &DesignMatrix) -> Result<DesignMatrix, AnalysisError> {
        let mut restricted = design.clone();
        if !self.config.excluded_parameters.is_empty() {
            if let Some(unknown) = self
                .config
                .excluded_parameters
                .iter()
                .find(|name| design.parameter_index(name).is_none())
            {
                return Err(AnalysisError::UnknownExcludedParameter(unknown.clone()));
            }
            if design
                .parameter_names()
                .iter()
                .all(|p| self.config.excluded_parameters.contains(p))
            {
                return Err(AnalysisError::NoParametersLeft);
            }
            restricted = restricted.without_parameters(&self.config.excluded_parameters)?;
        }
        if !self.config.targets.is_empty() {
            restricted = restricted.with_targets(&self.config.targets)?;
        }
        Ok(restricted)
    }

    /// Sensitivities of every fitted target per bootstrap replicate.
    ///
    /// `result[b][k]` is `None` when replicate `b` was degenerate for fit `k`.
    fn bootstrap(&self, design: &DesignMatrix, fits: &[FullFit]) -> Vec<Vec<Option<Vec<f64>>>> {
        let replicates = self.config.bootstrap_replicates;
        if replicates == 0 || fits.is_empty() {
            return Vec::new();
        }

        let run = |b: usize| self.replicate(design, fits, b as u64);

        #[cfg(feature = "parallel")]
        let results: Vec<_> = (0..replicates).into_par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = (0..replicates).map(run).collect();

        results
    }

    fn replicate(&self, design: &DesignMatrix, fits: &[FullFit], b: u64) -> Vec<Option<Vec<f64>>> {
        let n = design.nrows();
        let mut rng = stream_rng(self.config.bootstrap_seed, b);
        let rows: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();

        let x: DMatrix<f64> = design.parameters().select_rows(&rows);
        let Ok(prepared) =
            regression::prepare_parameters(design.parameter_names(), &x, self.config.rank_tolerance)
        else {
            return vec![None; fits.len()];
        };

        fits.iter()
            .map(|full| {
                let y = design.targets().column(full.column).select_rows(&rows);
                let (_, ys) = regression::standardize_target(&full.scaling.name, y.column(0)).ok()?;
                let fit = regression::fit(&prepared, &ys);
                Some(regression::decompose(&fit).sensitivities_pct)
            })
            .collect()
    }

    fn assemble(
        &self,
        design: &DesignMatrix,
        prepared: &PreparedParameters,
        vif: &[f64],
        full: &FullFit,
        samples: &[&Vec<f64>],
    ) -> TargetSensitivity {
        let target = full.scaling.name.clone();
        let d = &full.decomposition;
        let threshold = d.lae_pct + self.config.significance_margin;
        let confidence = self.config.confidence_level;

        let mut entries: Vec<SensitivityEntry> = prepared
            .scaling
            .iter()
            .enumerate()
            .map(|(j, scaling)| {
                let beta = full.fit.beta[j];
                SensitivityEntry {
                    parameter: scaling.name.clone(),
                    target: target.clone(),
                    standardized_coefficient: beta,
                    coefficient: beta * full.scaling.std_dev / scaling.std_dev,
                    sensitivity_pct: d.sensitivities_pct[j],
                    confidence_interval: percentile_interval(samples, j, confidence),
                    vif: vif[j],
                    significant: d.sensitivities_pct[j] > threshold,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.sensitivity_pct.total_cmp(&a.sensitivity_pct));

        let significant_parameters = entries
            .iter()
            .filter(|e| e.significant)
            .map(|e| e.parameter.clone())
            .collect();

        let bootstrap = (self.config.bootstrap_replicates > 0).then(|| BootstrapSummary {
            replicates: self.config.bootstrap_replicates,
            used: samples.len(),
            confidence_level: confidence,
            seed: self.config.bootstrap_seed,
        });

        let warnings = self.warnings(d, &full.fit, &prepared.scaling, vif, samples.len());
        for warning in &warnings {
            warn!("{}", warning.message(&target));
        }

        TargetSensitivity {
            target,
            rows: design.nrows(),
            entries,
            lae_pct: d.lae_pct,
            r_squared: d.r_squared,
            ols_r_squared: full.fit.ols_r_squared,
            residual_variance: full.fit.residual_variance,
            significance_margin: self.config.significance_margin,
            significant_parameters,
            target_scaling: full.scaling.clone(),
            parameter_scaling: prepared.scaling.clone(),
            bootstrap,
            warnings,
        }
    }

    fn warnings(
        &self,
        d: &Decomposition,
        fit: &LinearFit,
        scaling: &[ColumnScaling],
        vif: &[f64],
        used_replicates: usize,
    ) -> Vec<ModelValidityWarning> {
        let mut warnings = Vec::new();

        if d.lae_pct > self.config.lae_poor_pct {
            warnings.push(ModelValidityWarning::LinearApproximationPoor {
                lae_pct: d.lae_pct,
                threshold_pct: self.config.lae_poor_pct,
            });
        } else if d.lae_pct > self.config.lae_fair_pct {
            warnings.push(ModelValidityWarning::LinearApproximationFair {
                lae_pct: d.lae_pct,
                threshold_pct: self.config.lae_fair_pct,
            });
        }

        for (s, &v) in scaling.iter().zip(vif) {
            if v > self.config.vif_threshold {
                warnings.push(ModelValidityWarning::Multicollinearity {
                    parameter: s.name.clone(),
                    vif: v,
                    threshold: self.config.vif_threshold,
                });
            }
        }

        if (d.r_squared - fit.ols_r_squared).abs() > self.config.correlated_inputs_tolerance {
            warnings.push(ModelValidityWarning::CorrelatedInputs {
                r_squared: d.r_squared,
                ols_r_squared: fit.ols_r_squared,
            });
        }

        let replicates = self.config.bootstrap_replicates;
        if replicates > 0 && used_replicates < replicates {
            warnings.push(ModelValidityWarning::BootstrapDegenerate {
                failed: replicates - used_replicates,
                replicates,
            });
        }
        warnings
    }
}

/// Two-sided percentile interval of parameter `j` over bootstrap samples
fn percentile_interval(samples: &[&Vec<f64>], j: usize, confidence: f64) -> Option<(f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut values: Vec<f64> = samples.iter().map(|s| s[j]).collect();
    values.sort_by(f64::total_cmp);
    let tail = (1.0 - confidence) / 2.0;
    Some((
        percentile_sorted(&values, tail),
        percentile_sorted(&values, 1.0 - tail),
    ))
}
