//! Sensitivity report types
//!
//! The variance-based report is the terminal artifact of the pipeline. The
//! one-at-a-time report is produced independently from direct simulator calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DegenerateInputError;

use super::parameters::ParameterSet;
use super::trial::Outputs;

/// Mean and standard deviation used to standardize one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScaling {
    pub name: String,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Contribution of one parameter to one target's variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub parameter: String,
    pub target: String,
    /// Regression coefficient on standardized columns
    pub standardized_coefficient: f64,
    /// The same coefficient in original units (target units per parameter unit)
    pub coefficient: f64,
    /// Percentage of target variance attributed to this parameter
    pub sensitivity_pct: f64,
    /// Bootstrap percentile interval of `sensitivity_pct`
    pub confidence_interval: Option<(f64, f64)>,
    /// Variance inflation factor of this parameter
    pub vif: f64,
    /// Whether `sensitivity_pct` clears the noise floor (LAE + margin)
    pub significant: bool,
}

/// Non-fatal diagnostics attached to a fitted target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelValidityWarning {
    LinearApproximationFair {
        lae_pct: f64,
        threshold_pct: f64,
    },
    LinearApproximationPoor {
        lae_pct: f64,
        threshold_pct: f64,
    },
    Multicollinearity {
        parameter: String,
        vif: f64,
        threshold: f64,
    },
    /// Sample correlation between inputs makes the variance decomposition
    /// diverge from the classical coefficient of determination.
    CorrelatedInputs {
        r_squared: f64,
        ols_r_squared: f64,
    },
    BootstrapDegenerate {
        failed: usize,
        replicates: usize,
    },
}

impl ModelValidityWarning {
    /// Human-readable description with a suggested remedy
    pub fn message(&self, target: &str) -> String {
        match self {
            ModelValidityWarning::LinearApproximationFair {
                lae_pct,
                threshold_pct,
            } => format!(
                "target `{target}`: linear approximation error {lae_pct:.1}% exceeds {threshold_pct:.1}%; \
                 the linear model is only a fair fit, interpret small sensitivities with care"
            ),
            ModelValidityWarning::LinearApproximationPoor {
                lae_pct,
                threshold_pct,
            } => format!(
                "target `{target}`: linear approximation error {lae_pct:.1}% exceeds {threshold_pct:.1}%; \
                 the response is strongly non-linear or noisy, narrow the parameter ranges or use a non-linear method"
            ),
            ModelValidityWarning::Multicollinearity {
                parameter,
                vif,
                threshold,
            } => format!(
                "target `{target}`: parameter `{parameter}` has VIF {vif:.1} (> {threshold:.1}); \
                 its effect is confounded with other parameters, consider removing collinear parameter `{parameter}`"
            ),
            ModelValidityWarning::CorrelatedInputs {
                r_squared,
                ols_r_squared,
            } => format!(
                "target `{target}`: decomposition R² {r_squared:.4} differs from OLS R² {ols_r_squared:.4}; \
                 sampled inputs are correlated, increase the sample count"
            ),
            ModelValidityWarning::BootstrapDegenerate { failed, replicates } => format!(
                "target `{target}`: {failed} of {replicates} bootstrap replicates were degenerate; \
                 confidence intervals rest on fewer replicates, increase the sample count"
            ),
        }
    }
}

/// Bootstrap bookkeeping for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub replicates: usize,
    /// Replicates that produced a valid fit
    pub used: usize,
    pub confidence_level: f64,
    pub seed: u64,
}

/// Variance decomposition of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSensitivity {
    pub target: String,
    /// Number of design rows used in the fit
    pub rows: usize,
    /// Entries ranked by `sensitivity_pct`, largest first
    pub entries: Vec<SensitivityEntry>,
    /// Linear approximation error, percent of total variance
    pub lae_pct: f64,
    /// Explained share of the decomposed variance; `lae_pct == 100 (1 - r_squared)`
    pub r_squared: f64,
    /// Classical coefficient of determination `1 - SS_res / SS_tot`
    pub ols_r_squared: f64,
    /// Unexplained variance of the standardized target
    pub residual_variance: f64,
    pub significance_margin: f64,
    /// Parameters whose sensitivity exceeds `lae_pct + significance_margin`, ranked
    pub significant_parameters: Vec<String>,
    pub target_scaling: ColumnScaling,
    pub parameter_scaling: Vec<ColumnScaling>,
    pub bootstrap: Option<BootstrapSummary>,
    pub warnings: Vec<ModelValidityWarning>,
}

impl TargetSensitivity {
    pub fn entry(&self, parameter: &str) -> Option<&SensitivityEntry> {
        self.entries.iter().find(|e| e.parameter == parameter)
    }

    pub fn sensitivity(&self, parameter: &str) -> Option<f64> {
        self.entry(parameter).map(|e| e.sensitivity_pct)
    }

    pub fn is_significant(&self, parameter: &str) -> bool {
        self.significant_parameters.iter().any(|p| p == parameter)
    }

    /// Parameter names, most influential first
    pub fn ranking(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.parameter.as_str()).collect()
    }

    /// Sum of all sensitivities plus the LAE; 100 up to rounding
    pub fn closure_pct(&self) -> f64 {
        self.entries.iter().map(|e| e.sensitivity_pct).sum::<f64>() + self.lae_pct
    }
}

/// A target whose fit was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: DegenerateInputError,
}

/// Result of a variance-based sensitivity analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub created_at: jiff::Timestamp,
    /// Number of design rows analyzed
    pub rows: usize,
    /// Parameters included in the fits, in design order
    pub parameters: Vec<String>,
    /// Parameters removed by configuration before fitting
    pub excluded_parameters: Vec<String>,
    /// Fitted targets, in design order
    pub targets: Vec<TargetSensitivity>,
    /// Targets whose fit was rejected
    pub failures: Vec<TargetFailure>,
}

impl SensitivityReport {
    pub fn target(&self, name: &str) -> Option<&TargetSensitivity> {
        self.targets.iter().find(|t| t.target == name)
    }

    pub fn failure(&self, name: &str) -> Option<&DegenerateInputError> {
        self.failures
            .iter()
            .find(|f| f.target == name)
            .map(|f| &f.error)
    }

    /// True when every target was fitted
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// All warnings as `(target, warning)` pairs
    pub fn warnings(&self) -> impl Iterator<Item = (&str, &ModelValidityWarning)> {
        self.targets
            .iter()
            .flat_map(|t| t.warnings.iter().map(move |w| (t.target.as_str(), w)))
    }
}

/// Caveats of the one-at-a-time method, carried with every OAT report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OatLimitations {
    /// Derivatives are valid only near the nominal point
    pub local_only: bool,
    /// Parameter interactions are not captured
    pub captures_interactions: bool,
    pub description: String,
}

impl Default for OatLimitations {
    fn default() -> Self {
        Self {
            local_only: true,
            captures_interactions: false,
            description: "central finite differences around the nominal point; \
                          valid only locally and blind to parameter interactions"
                .to_string(),
        }
    }
}

/// Local sensitivity of one target to one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OatSensitivity {
    pub parameter: String,
    pub target: String,
    pub nominal_value: f64,
    pub step: f64,
    pub nominal_output: f64,
    pub plus_output: f64,
    pub minus_output: f64,
    /// Central-difference estimate of the partial derivative
    pub derivative: f64,
    /// `derivative * x / y0`; `None` when the nominal output is zero
    pub normalized: Option<f64>,
}

/// Result of a one-at-a-time analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OatReport {
    pub perturbation_fraction: f64,
    pub nominal: ParameterSet,
    pub nominal_outputs: Outputs,
    /// `parameter -> target -> sensitivity`
    pub sensitivities: BTreeMap<String, BTreeMap<String, OatSensitivity>>,
    pub simulator_calls: usize,
    pub limitations: OatLimitations,
}

impl OatReport {
    pub fn get(&self, parameter: &str, target: &str) -> Option<&OatSensitivity> {
        self.sensitivities.get(parameter)?.get(target)
    }

    /// Normalized local sensitivity, if defined
    pub fn local_sensitivity(&self, parameter: &str, target: &str) -> Option<f64> {
        self.get(parameter, target)?.normalized
    }

    /// Parameters ranked by absolute normalized sensitivity for one target
    pub fn ranking(&self, target: &str) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .sensitivities
            .iter()
            .filter_map(|(param, by_target)| {
                let s = by_target.get(target)?.normalized?;
                Some((param.as_str(), s))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked
    }
}
