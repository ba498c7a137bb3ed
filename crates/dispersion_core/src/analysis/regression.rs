//! Least squares on standardized columns
//!
//! Parameters are standardized once per design (or bootstrap replicate) and
//! the inverse correlation matrix is shared by every target fit. Coefficients
//! come from the normal equations through a Cholesky factorization; a
//! rank-deficient correlation matrix is reported, never regularized away.

use nalgebra::{DMatrix, DVector, DVectorView};

use crate::error::DegenerateInputError;
use crate::model::ColumnScaling;

/// Relative standard deviation below which a column counts as constant
const CONSTANT_TOLERANCE: f64 = 1e-12;

/// Eigenvector loadings below this share of the largest are not implicated
/// in a collinearity
const LOADING_SHARE: f64 = 0.1;

/// Mean and population standard deviation of a column
pub(crate) fn column_scaling(name: &str, column: DVectorView<'_, f64>) -> ColumnScaling {
    let n = column.len() as f64;
    let mean = column.sum() / n;
    let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    ColumnScaling {
        name: name.to_string(),
        mean,
        std_dev: variance.sqrt(),
    }
}

fn is_constant(scaling: &ColumnScaling) -> bool {
    scaling.std_dev <= CONSTANT_TOLERANCE * scaling.mean.abs().max(1.0)
}

fn has_non_finite(column: DVectorView<'_, f64>) -> bool {
    column.iter().any(|v| !v.is_finite())
}

/// Standardized parameter block shared by all target fits
#[derive(Debug, Clone)]
pub(crate) struct PreparedParameters {
    pub z: DMatrix<f64>,
    pub scaling: Vec<ColumnScaling>,
    /// Inverse of the parameter correlation matrix `Z'Z / n`
    pub correlation_inverse: DMatrix<f64>,
}

impl PreparedParameters {
    pub fn nrows(&self) -> usize {
        self.z.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.z.ncols()
    }

    /// Variance inflation factors: the diagonal of the inverse correlation matrix
    pub fn vif(&self) -> Vec<f64> {
        self.correlation_inverse.diagonal().iter().copied().collect()
    }
}

pub(crate) fn prepare_parameters(
    names: &[String],
    x: &DMatrix<f64>,
    rank_tolerance: f64,
) -> Result<PreparedParameters, DegenerateInputError> {
    let (n, p) = x.shape();
    if n < p + 2 {
        return Err(DegenerateInputError::TooFewRows {
            rows: n,
            parameters: p,
        });
    }

    if let Some(j) = (0..p).find(|&j| has_non_finite(x.column(j))) {
        return Err(DegenerateInputError::NonFinite {
            column: names[j].clone(),
        });
    }

    let scaling: Vec<ColumnScaling> = (0..p)
        .map(|j| column_scaling(&names[j], x.column(j)))
        .collect();
    if let Some(s) = scaling.iter().find(|s| is_constant(s)) {
        return Err(DegenerateInputError::ConstantParameter {
            parameter: s.name.clone(),
            rows: n,
        });
    }

    let z = DMatrix::from_fn(n, p, |i, j| (x[(i, j)] - scaling[j].mean) / scaling[j].std_dev);
    let correlation = (z.transpose() * &z) / n as f64;

    check_rank(names, &correlation, rank_tolerance)?;

    let correlation_inverse = correlation
        .clone()
        .cholesky()
        .map(|c| c.inverse())
        .ok_or_else(|| collinearity(names, &correlation))?;

    Ok(PreparedParameters {
        z,
        scaling,
        correlation_inverse,
    })
}

fn check_rank(
    names: &[String],
    correlation: &DMatrix<f64>,
    rank_tolerance: f64,
) -> Result<(), DegenerateInputError> {
    let eigen = correlation.clone().symmetric_eigen();
    let largest = eigen
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let smallest = eigen
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);

    if smallest > rank_tolerance * largest {
        return Ok(());
    }
    Err(collinearity(names, correlation))
}

/// Name the parameters loading on the smallest eigenvector of `correlation`
fn collinearity(names: &[String], correlation: &DMatrix<f64>) -> DegenerateInputError {
    let eigen = correlation.clone().symmetric_eigen();
    let (k, min_eigenvalue) = eigen
        .eigenvalues
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0));

    let direction = eigen.eigenvectors.column(k);
    let peak = direction.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let involved: Vec<String> = direction
        .iter()
        .enumerate()
        .filter(|(_, v)| v.abs() >= LOADING_SHARE * peak)
        .map(|(j, _)| names[j].clone())
        .collect();

    // The later column in design order is the one to drop
    let suggested_removal = involved.last().cloned().unwrap_or_default();

    DegenerateInputError::Collinear {
        parameters: involved,
        suggested_removal,
        min_eigenvalue,
    }
}

/// Standardize a target column
pub(crate) fn standardize_target(
    name: &str,
    y: DVectorView<'_, f64>,
) -> Result<(ColumnScaling, DVector<f64>), DegenerateInputError> {
    if has_non_finite(y) {
        return Err(DegenerateInputError::NonFinite {
            column: name.to_string(),
        });
    }
    let scaling = column_scaling(name, y);
    if is_constant(&scaling) {
        return Err(DegenerateInputError::ConstantTarget {
            target: name.to_string(),
            rows: y.len(),
        });
    }
    let standardized = y.map(|v| (v - scaling.mean) / scaling.std_dev);
    Ok((scaling, standardized))
}

/// OLS fit of a standardized target on the prepared parameters
#[derive(Debug, Clone)]
pub(crate) struct LinearFit {
    pub beta: DVector<f64>,
    /// Unbiased residual variance `SS_res / (n - p - 1)`
    pub residual_variance: f64,
    /// `1 - SS_res / SS_tot`
    pub ols_r_squared: f64,
}

pub(crate) fn fit(prepared: &PreparedParameters, y: &DVector<f64>) -> LinearFit {
    let n = prepared.nrows();
    let p = prepared.ncols();

    let zty = (prepared.z.transpose() * y) / n as f64;
    let beta = &prepared.correlation_inverse * zty;

    let residuals = y - &prepared.z * &beta;
    let ss_res = residuals.norm_squared();
    let ss_tot = y.norm_squared();

    LinearFit {
        beta,
        residual_variance: ss_res / (n - p - 1) as f64,
        ols_r_squared: 1.0 - ss_res / ss_tot,
    }
}

/// Variance shares of one fitted target
#[derive(Debug, Clone)]
pub(crate) struct Decomposition {
    /// `100 β_j² / (Σβ² + σ²)` per parameter
    pub sensitivities_pct: Vec<f64>,
    /// `100 σ² / (Σβ² + σ²)`
    pub lae_pct: f64,
    /// `Σβ² / (Σβ² + σ²)`
    pub r_squared: f64,
}

pub(crate) fn decompose(fit: &LinearFit) -> Decomposition {
    let explained: f64 = fit.beta.iter().map(|b| b * b).sum();
    let total = explained + fit.residual_variance;

    Decomposition {
        sensitivities_pct: fit.beta.iter().map(|b| 100.0 * b * b / total).collect(),
        lae_pct: 100.0 * fit.residual_variance / total,
        r_squared: explained / total,
    }
}
