mod parameters;
mod report;
mod results;
mod trial;

pub use parameters::{Distribution, ParameterSet, ParameterSpec};
pub use report::{
    BootstrapSummary, ColumnScaling, ModelValidityWarning, OatLimitations, OatReport,
    OatSensitivity, SensitivityEntry, SensitivityReport, TargetFailure, TargetSensitivity,
};
pub use results::{EnsembleSummary, EnsembleWarning, MetricStats};
pub use trial::{FailureReason, Outputs, TrialResult, failure_breakdown};
