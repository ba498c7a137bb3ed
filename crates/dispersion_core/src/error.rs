use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::FailureReason;

/// Errors raised while validating parameter specs or drawing samples.
///
/// These are configuration-time failures: they surface before any trial runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplingError {
    #[error("parameter `{parameter}`: invalid {distribution} parameters ({reason})")]
    InvalidParameters {
        parameter: String,
        distribution: &'static str,
        reason: String,
    },

    #[error(
        "parameter `{parameter}`: truncated normal rejected {attempts} consecutive draws \
         outside [{min}, {max}]; widen the bounds or move the mean inside them"
    )]
    TruncationBudgetExceeded {
        parameter: String,
        attempts: usize,
        min: f64,
        max: f64,
    },

    #[error("parameter `{0}` is specified more than once")]
    DuplicateParameter(String),

    #[error("no parameters to sample")]
    NoParameters,
}

/// Failure reported by the external simulator for a single evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct SimulationError {
    message: String,
}

impl SimulationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Fatal errors of an ensemble run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnsembleError {
    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error("invalid ensemble configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "ensemble failed: none of {trials} trials succeeded ({}); \
         check the simulator against the nominal parameters or increase the sample count",
        format_failures(.failures)
    )]
    EnsembleFailed {
        trials: usize,
        failures: BTreeMap<FailureReason, usize>,
    },

    #[error(
        "failure rate {:.1}% exceeds the abort threshold of {:.1}% ({}); \
         inspect the failing trials or relax the parameter ranges",
        .rate * 100.0,
        .threshold * 100.0,
        format_failures(.failures)
    )]
    FailureRateExceeded {
        rate: f64,
        threshold: f64,
        failures: BTreeMap<FailureReason, usize>,
    },
}

fn format_failures(failures: &BTreeMap<FailureReason, usize>) -> String {
    if failures.is_empty() {
        return "no failures recorded".to_string();
    }
    failures
        .iter()
        .map(|(reason, count)| format!("{reason}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors assembling or reshaping a design matrix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DesignError {
    #[error("design matrix has no rows; run more trials or check the failure breakdown")]
    NoRows,

    #[error("design matrix has no {0} columns")]
    NoColumns(&'static str),

    #[error("unknown {kind} column `{name}`")]
    UnknownColumn { kind: &'static str, name: String },

    #[error("duplicate {kind} column `{name}`")]
    DuplicateColumn { kind: &'static str, name: String },

    #[error(
        "parameter and target matrices disagree on row count ({parameters} vs {targets}); \
         the two files must come from the same run"
    )]
    RowCountMismatch { parameters: usize, targets: usize },

    #[error("row {row} has {found} values but {expected} columns are named")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("parameter set for trial {trial} does not match the design's parameter columns")]
    ParameterMismatch { trial: usize },
}

/// A column set that cannot support a linear sensitivity fit.
///
/// Raised per target; other targets in the same report are still fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegenerateInputError {
    #[error(
        "parameter `{parameter}` has zero variance across {rows} rows; its coefficient is \
         undefined. Exclude it from the analysis or give it a non-degenerate distribution"
    )]
    ConstantParameter { parameter: String, rows: usize },

    #[error(
        "target `{target}` has zero variance across {rows} rows; there is nothing to \
         decompose. Drop the target or widen the parameter ranges"
    )]
    ConstantTarget { target: String, rows: usize },

    #[error(
        "parameters [{}] are perfectly collinear (smallest correlation eigenvalue {min_eigenvalue:.3e}); \
         remove collinear parameter `{suggested_removal}`",
        .parameters.join(", ")
    )]
    Collinear {
        parameters: Vec<String>,
        suggested_removal: String,
        min_eigenvalue: f64,
    },

    #[error(
        "{rows} rows cannot support a fit of {parameters} parameters (need at least {}); \
         increase the sample count",
        .parameters + 2
    )]
    TooFewRows { rows: usize, parameters: usize },

    #[error("column `{column}` contains non-finite values")]
    NonFinite { column: String },
}

/// Errors that prevent a sensitivity report from being produced at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Design(#[from] DesignError),

    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    #[error("excluded parameter `{0}` is not a column of the design matrix")]
    UnknownExcludedParameter(String),

    #[error(
        "every parameter was excluded from the analysis; keep at least one varied parameter"
    )]
    NoParametersLeft,
}

/// Errors from the one-at-a-time analyzer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OatError {
    #[error("perturbation fraction {0} must be finite and in (0, 1)")]
    InvalidPerturbation(f64),

    #[error("no nominal value for parameter `{parameter}`")]
    MissingNominal { parameter: String },

    #[error(
        "nominal value of `{parameter}` is zero; a relative perturbation would not move it. \
         Shift the nominal point or analyze the parameter in an offset unit"
    )]
    ZeroNominal { parameter: String },

    #[error("simulation failed at {point}: {source}")]
    Simulation {
        point: String,
        #[source]
        source: SimulationError,
    },

    #[error("simulation at {point} returned non-finite `{target}` = {value}")]
    NonFiniteOutput {
        point: String,
        target: String,
        value: f64,
    },

    #[error("simulation at {point} did not report target `{target}`")]
    MissingOutput { point: String, target: String },

    #[error("simulation at the nominal point returned no outputs")]
    NoOutputs,
}

/// Errors reading or writing exported matrices and reports.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("matrix file has no header row")]
    MissingHeader,

    #[error(transparent)]
    Design(#[from] DesignError),
}

/// Errors loading or validating a study configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {message}")]
    Io { path: String, message: String },

    #[error("yaml error: {0}")]
    Yaml(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Sampling(#[from] SamplingError),
}

impl From<ConfigError> for EnsembleError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Sampling(e) => EnsembleError::Sampling(e),
            other => EnsembleError::InvalidConfig(other.to_string()),
        }
    }
}
