//! Dispersion and sensitivity analysis library
//!
//! This crate wraps an arbitrary black-box simulator in an uncertainty
//! quantification workflow:
//! - Seeded, reproducible sampling of uncertain inputs (normal, uniform,
//!   truncated normal, log-normal, triangular)
//! - Parallel ensemble execution with per-trial failure isolation, timeouts
//!   and an ensemble deadline
//! - Ensemble summaries (mean, standard deviation, percentiles)
//! - Variance-based sensitivity from standardized linear regression, with
//!   the linear approximation error (LAE) reported alongside every ranking
//! - One-at-a-time finite-difference sensitivity around a nominal point
//! - Plain-text export of design matrices and YAML/JSON reports
//!
//! # Example
//!
//! ```ignore
//! use dispersion_core::{EnsembleRunner, StudyBuilder, VarianceAnalyzer};
//! use dispersion_core::model::{Outputs, ParameterSet, ParameterSpec};
//! use dispersion_core::error::SimulationError;
//!
//! let study = StudyBuilder::new()
//!     .parameter(ParameterSpec::normal("thrust_scale", 1.0, 0.05))
//!     .parameter(ParameterSpec::uniform("launch_angle_deg", 84.0, 86.0))
//!     .trials(500)
//!     .seed(42)
//!     .build()?;
//!
//! let run = EnsembleRunner::new(study.ensemble.clone()).run(&study.parameters, || {
//!     |p: &ParameterSet| -> Result<Outputs, SimulationError> { fly(p) }
//! })?;
//!
//! let summary = run.summarize(&study.ensemble.percentiles)?;
//! let report = VarianceAnalyzer::new(study.analysis.clone()).fit(&run.design_matrix()?)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod analysis;
pub mod design;
pub mod ensemble;
pub mod error;
pub mod executor;
pub mod export;
pub mod oat;
pub mod sampling;
pub mod simulator;
pub mod stats;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use analysis::{VarianceAnalysisConfig, VarianceAnalyzer};
pub use config::{EnsembleConfig, OatConfig, StudyBuilder, StudyConfig};
pub use design::{DesignMatrix, DesignMatrixBuilder};
pub use ensemble::{EnsembleProgress, EnsembleRun, EnsembleRunner, EnsembleStatus, TrialBatch};
pub use executor::TrialExecutor;
pub use export::{Delimiter, ReportExporter};
pub use oat::OatAnalyzer;
pub use sampling::ParameterSampler;
pub use simulator::Simulator;
