//! Design matrices: successful trials as aligned parameter and target columns

use std::sync::Arc;

use nalgebra::{DMatrix, DVectorView};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ensemble::{EnsembleRun, TrialBatch};
use crate::error::DesignError;
use crate::model::{ParameterSet, TrialResult};

/// Row-aligned parameter (N x P) and target (N x T) matrices.
///
/// Row `i` of both matrices comes from the same trial, recorded in
/// `trial_indices`. Parameter columns follow `ParameterSpec` order.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    parameter_names: Vec<String>,
    target_names: Vec<String>,
    parameters: DMatrix<f64>,
    targets: DMatrix<f64>,
    trial_indices: Vec<usize>,
}

fn index_names<'a>(
    kind: &'static str,
    names: &'a [String],
) -> Result<FxHashMap<&'a str, usize>, DesignError> {
    let mut index = FxHashMap::default();
    for (i, name) in names.iter().enumerate() {
        if index.insert(name.as_str(), i).is_some() {
            return Err(DesignError::DuplicateColumn {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(index)
}

impl DesignMatrix {
    pub fn new(
        parameter_names: Vec<String>,
        parameters: DMatrix<f64>,
        target_names: Vec<String>,
        targets: DMatrix<f64>,
    ) -> Result<Self, DesignError> {
        if parameter_names.is_empty() {
            return Err(DesignError::NoColumns("parameter"));
        }
        if target_names.is_empty() {
            return Err(DesignError::NoColumns("target"));
        }
        index_names("parameter", &parameter_names)?;
        index_names("target", &target_names)?;

        if parameters.nrows() != targets.nrows() {
            return Err(DesignError::RowCountMismatch {
                parameters: parameters.nrows(),
                targets: targets.nrows(),
            });
        }
        if parameters.nrows() == 0 {
            return Err(DesignError::NoRows);
        }
        if parameters.ncols() != parameter_names.len() {
            return Err(DesignError::RaggedRow {
                row: 0,
                expected: parameter_names.len(),
                found: parameters.ncols(),
            });
        }
        if targets.ncols() != target_names.len() {
            return Err(DesignError::RaggedRow {
                row: 0,
                expected: target_names.len(),
                found: targets.ncols(),
            });
        }

        let trial_indices = (0..parameters.nrows()).collect();
        Ok(Self {
            parameter_names,
            target_names,
            parameters,
            targets,
            trial_indices,
        })
    }

    /// Build from row-major values, as read back from exported files
    pub fn from_rows(
        parameter_names: Vec<String>,
        parameter_rows: &[Vec<f64>],
        target_names: Vec<String>,
        target_rows: &[Vec<f64>],
    ) -> Result<Self, DesignError> {
        if parameter_rows.len() != target_rows.len() {
            return Err(DesignError::RowCountMismatch {
                parameters: parameter_rows.len(),
                targets: target_rows.len(),
            });
        }
        let parameters = rows_to_matrix(parameter_rows, parameter_names.len())?;
        let targets = rows_to_matrix(target_rows, target_names.len())?;
        Self::new(parameter_names, parameters, target_names, targets)
    }

    /// Attach the originating trial index of every row
    pub fn with_trial_indices(mut self, trial_indices: Vec<usize>) -> Result<Self, DesignError> {
        if trial_indices.len() != self.nrows() {
            return Err(DesignError::RowCountMismatch {
                parameters: self.nrows(),
                targets: trial_indices.len(),
            });
        }
        self.trial_indices = trial_indices;
        Ok(self)
    }

    pub fn nrows(&self) -> usize {
        self.parameters.nrows()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    pub fn parameters(&self) -> &DMatrix<f64> {
        &self.parameters
    }

    pub fn targets(&self) -> &DMatrix<f64> {
        &self.targets
    }

    pub fn trial_indices(&self) -> &[usize] {
        &self.trial_indices
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }

    pub fn target_index(&self, name: &str) -> Option<usize> {
        self.target_names.iter().position(|n| n == name)
    }

    pub fn parameter_column(&self, name: &str) -> Option<DVectorView<'_, f64>> {
        self.parameter_index(name).map(|j| self.parameters.column(j))
    }

    pub fn target_column(&self, name: &str) -> Option<DVectorView<'_, f64>> {
        self.target_index(name).map(|j| self.targets.column(j))
    }

    /// A design made of the given rows, repeats allowed
    pub fn select_rows(&self, rows: &[usize]) -> DesignMatrix {
        DesignMatrix {
            parameter_names: self.parameter_names.clone(),
            target_names: self.target_names.clone(),
            parameters: self.parameters.select_rows(rows),
            targets: self.targets.select_rows(rows),
            trial_indices: rows.iter().map(|&r| self.trial_indices[r]).collect(),
        }
    }

    /// A design without the named parameter columns
    pub fn without_parameters(&self, excluded: &[String]) -> Result<DesignMatrix, DesignError> {
        let index = index_names("parameter", &self.parameter_names)?;
        let mut drop = Vec::with_capacity(excluded.len());
        for name in excluded {
            let j = index
                .get(name.as_str())
                .copied()
                .ok_or_else(|| DesignError::UnknownColumn {
                    kind: "parameter",
                    name: name.clone(),
                })?;
            drop.push(j);
        }
        let keep: Vec<usize> = (0..self.parameter_names.len())
            .filter(|j| !drop.contains(j))
            .collect();
        if keep.is_empty() {
            return Err(DesignError::NoColumns("parameter"));
        }

        Ok(DesignMatrix {
            parameter_names: keep.iter().map(|&j| self.parameter_names[j].clone()).collect(),
            target_names: self.target_names.clone(),
            parameters: self.parameters.select_columns(&keep),
            targets: self.targets.clone(),
            trial_indices: self.trial_indices.clone(),
        })
    }

    /// A design restricted to the named targets, in the given order
    pub fn with_targets(&self, names: &[String]) -> Result<DesignMatrix, DesignError> {
        if names.is_empty() {
            return Err(DesignError::NoColumns("target"));
        }
        index_names("target", names)?;
        let cols = names
            .iter()
            .map(|name| {
                self.target_index(name)
                    .ok_or_else(|| DesignError::UnknownColumn {
                        kind: "target",
                        name: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DesignMatrix {
            parameter_names: self.parameter_names.clone(),
            target_names: names.to_vec(),
            parameters: self.parameters.clone(),
            targets: self.targets.select_columns(&cols),
            trial_indices: self.trial_indices.clone(),
        })
    }
}

fn rows_to_matrix(rows: &[Vec<f64>], ncols: usize) -> Result<DMatrix<f64>, DesignError> {
    let mut flat = Vec::with_capacity(rows.len() * ncols);
    for (row, values) in rows.iter().enumerate() {
        if values.len() != ncols {
            return Err(DesignError::RaggedRow {
                row,
                expected: ncols,
                found: values.len(),
            });
        }
        flat.extend_from_slice(values);
    }
    Ok(DMatrix::from_row_slice(rows.len(), ncols, &flat))
}

/// Accumulates successful trials into a design matrix.
///
/// Failed trials are skipped. When no target list is given, the targets are
/// the sorted output names of the first successful trial; later trials
/// missing any of them are skipped and counted.
#[derive(Debug, Clone)]
pub struct DesignMatrixBuilder {
    parameter_names: Arc<[String]>,
    target_names: Option<Vec<String>>,
    parameter_values: Vec<f64>,
    target_values: Vec<f64>,
    trial_indices: Vec<usize>,
    skipped_failures: usize,
    skipped_incomplete: usize,
}

impl DesignMatrixBuilder {
    pub fn new(parameter_names: impl Into<Arc<[String]>>) -> Self {
        Self {
            parameter_names: parameter_names.into(),
            target_names: None,
            parameter_values: Vec::new(),
            target_values: Vec::new(),
            trial_indices: Vec::new(),
            skipped_failures: 0,
            skipped_incomplete: 0,
        }
    }

    /// Fix the target columns and their order
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_names = Some(targets);
        self
    }

    /// Builder pre-filled with every trial of a run
    pub fn from_run(run: &EnsembleRun) -> Result<Self, DesignError> {
        let Some(first) = run.parameter_sets.first() else {
            return Err(DesignError::NoRows);
        };
        let mut builder = Self::new(Arc::clone(first.shared_names()));
        for (i, (set, result)) in run.parameter_sets.iter().zip(&run.results).enumerate() {
            builder.push(i, set, result)?;
        }
        Ok(builder)
    }

    /// Add one trial; returns whether it became a row
    pub fn push(
        &mut self,
        trial: usize,
        parameters: &ParameterSet,
        result: &TrialResult,
    ) -> Result<bool, DesignError> {
        let same_columns = Arc::ptr_eq(parameters.shared_names(), &self.parameter_names)
            || parameters.names() == &*self.parameter_names;
        if !same_columns {
            return Err(DesignError::ParameterMismatch { trial });
        }

        let Some(outputs) = result.outputs() else {
            self.skipped_failures += 1;
            return Ok(false);
        };

        let targets = self
            .target_names
            .get_or_insert_with(|| outputs.keys().cloned().collect());

        let row: Option<Vec<f64>> = targets.iter().map(|t| outputs.get(t).copied()).collect();
        let Some(row) = row else {
            debug!(trial, "trial lacks a target output; skipped");
            self.skipped_incomplete += 1;
            return Ok(false);
        };

        self.parameter_values.extend_from_slice(parameters.values());
        self.target_values.extend(row);
        self.trial_indices.push(trial);
        Ok(true)
    }

    /// Add every trial of an ensemble batch
    pub fn push_batch(&mut self, batch: &TrialBatch<'_>) -> Result<(), DesignError> {
        for (trial, set, result) in batch.iter() {
            self.push(trial, set, result)?;
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.trial_indices.len()
    }

    /// Failed trials left out of the design
    pub fn skipped_failures(&self) -> usize {
        self.skipped_failures
    }

    /// Successful trials left out for missing a target
    pub fn skipped_incomplete(&self) -> usize {
        self.skipped_incomplete
    }

    pub fn build(self) -> Result<DesignMatrix, DesignError> {
        let n = self.trial_indices.len();
        if n == 0 {
            return Err(DesignError::NoRows);
        }
        let target_names = self.target_names.unwrap_or_default();
        let p = self.parameter_names.len();
        let t = target_names.len();

        if self.skipped_failures + self.skipped_incomplete > 0 {
            debug!(
                rows = n,
                skipped_failures = self.skipped_failures,
                skipped_incomplete = self.skipped_incomplete,
                "design matrix built with skipped trials"
            );
        }

        DesignMatrix::new(
            self.parameter_names.to_vec(),
            DMatrix::from_row_slice(n, p, &self.parameter_values),
            target_names,
            DMatrix::from_row_slice(n, t, &self.target_values),
        )?
        .with_trial_indices(self.trial_indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailureReason, Outputs};

    fn names() -> Arc<[String]> {
        vec!["a".to_string(), "b".to_string()].into()
    }

    fn set(a: f64, b: f64) -> ParameterSet {
        ParameterSet::new(names(), vec![a, b]).unwrap()
    }

    fn success(pairs: &[(&str, f64)]) -> TrialResult {
        TrialResult::Success {
            outputs: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect::<Outputs>(),
        }
    }

    #[test]
    fn test_builder_skips_failures_and_incomplete_rows() {
        let mut builder = DesignMatrixBuilder::new(names());
        assert!(builder.push(0, &set(1.0, 2.0), &success(&[("y", 3.0), ("z", 1.0)])).unwrap());
        assert!(
            !builder
                .push(1, &set(0.0, 0.0), &TrialResult::failure(FailureReason::Panicked, "x"))
                .unwrap()
        );
        assert!(!builder.push(2, &set(5.0, 5.0), &success(&[("y", 1.0)])).unwrap());
        assert!(builder.push(3, &set(4.0, 6.0), &success(&[("z", 2.0), ("y", 9.0)])).unwrap());

        assert_eq!(builder.skipped_failures(), 1);
        assert_eq!(builder.skipped_incomplete(), 1);

        let design = builder.build().unwrap();
        assert_eq!(design.nrows(), 2);
        assert_eq!(design.target_names(), ["y".to_string(), "z".to_string()]);
        assert_eq!(design.trial_indices(), [0, 3]);
        assert_eq!(design.parameters()[(1, 0)], 4.0);
        assert_eq!(design.targets()[(1, 0)], 9.0);
    }

    #[test]
    fn test_mismatched_parameter_set_rejected() {
        let mut builder = DesignMatrixBuilder::new(names());
        let other = ParameterSet::from_pairs([("c", 1.0), ("d", 2.0)]);
        assert_eq!(
            builder.push(5, &other, &success(&[("y", 1.0)])),
            Err(DesignError::ParameterMismatch { trial: 5 })
        );
    }

    #[test]
    fn test_empty_builder_has_no_rows() {
        assert_eq!(
            DesignMatrixBuilder::new(names()).build(),
            Err(DesignError::NoRows)
        );
    }

    #[test]
    fn test_without_parameters_and_row_selection() {
        let design = DesignMatrix::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            vec!["y".into()],
            &[vec![10.0], vec![20.0]],
        )
        .unwrap();

        let reduced = design.without_parameters(&["b".to_string()]).unwrap();
        assert_eq!(reduced.parameter_names(), ["a".to_string(), "c".to_string()]);
        assert_eq!(reduced.parameters()[(1, 1)], 6.0);
        assert!(design.without_parameters(&["nope".to_string()]).is_err());

        let resampled = design.select_rows(&[1, 1, 0]);
        assert_eq!(resampled.nrows(), 3);
        assert_eq!(resampled.targets()[(0, 0)], 20.0);
        assert_eq!(resampled.trial_indices(), [1, 1, 0]);
    }

    #[test]
    fn test_from_rows_rejects_mismatched_counts() {
        let err = DesignMatrix::from_rows(
            vec!["a".into()],
            &[vec![1.0], vec![2.0]],
            vec!["y".into()],
            &[vec![1.0]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            DesignError::RowCountMismatch {
                parameters: 2,
                targets: 1
            }
        );
    }

    #[test]
    fn test_duplicate_column_names_rejected() {
        let err = DesignMatrix::from_rows(
            vec!["a".into(), "a".into()],
            &[vec![1.0, 2.0]],
            vec!["y".into()],
            &[vec![1.0]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            DesignError::DuplicateColumn {
                kind: "parameter",
                name: "a".into()
            }
        );

        let design = DesignMatrix::from_rows(
            vec!["a".into(), "b".into()],
            &[vec![1.0, 2.0]],
            vec!["y".into()],
            &[vec![1.0]],
        )
        .unwrap();
        assert_eq!(design.parameter_index("b"), Some(1));
        assert!(design.without_parameters(&["a".to_string()]).is_ok());
    }
}
