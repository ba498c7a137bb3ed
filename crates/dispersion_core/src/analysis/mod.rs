//! Variance-based sensitivity analysis.
//!
//! Every target column of a design matrix is regressed on the standardized
//! parameter columns. The squared standardized coefficients, together with
//! the residual variance, partition the target's variance:
//!
//! ```text
//! S_j = 100 β_j² / (Σ β² + σ²)        LAE = 100 σ² / (Σ β² + σ²)
//! ```
//!
//! so the sensitivities and the linear approximation error (LAE) always sum
//! to 100. A parameter is significant when its share exceeds the LAE by the
//! configured margin.
//!
//! ```ignore
//! use dispersion_core::analysis::{VarianceAnalysisConfig, VarianceAnalyzer};
//!
//! let design = run.design_matrix()?;
//! let report = VarianceAnalyzer::new(VarianceAnalysisConfig::default()).fit(&design)?;
//! for entry in &report.target("apogee_m").unwrap().entries {
//!     println!("{}: {:.1}%", entry.parameter, entry.sensitivity_pct);
//! }
//! ```

mod config;
mod regression;
mod variance;

pub use config::VarianceAnalysisConfig;
pub use variance::VarianceAnalyzer;
