//! Plain-text matrix files and structured report documents
//!
//! A design matrix is exported as two files, `parameters.txt` and
//! `targets.txt`, with a header row of column names and one row per trial.
//! Row `i` of both files is the same trial. The reader accepts whitespace or
//! comma delimiters and skips `#` comment lines.
//!
//! Sensitivity reports are written as YAML documents with one record per
//! target, or as JSON carrying every field of the report.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::design::DesignMatrix;
use crate::error::ExportError;
use crate::model::{EnsembleSummary, OatReport, SensitivityReport};

pub const PARAMETERS_FILE: &str = "parameters.txt";
pub const TARGETS_FILE: &str = "targets.txt";

/// Column separator of exported matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// Space-padded, aligned columns
    #[default]
    Whitespace,
    Comma,
}

/// One bootstrap-annotated entry of an exported report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub parameter: String,
    pub sensitivity_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<[f64; 2]>,
}

/// One target of an exported report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target: String,
    pub r_squared: f64,
    pub lae_pct: f64,
    pub entries: Vec<EntryRecord>,
    pub significant_parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A target that could not be fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub target: String,
    pub error: String,
}

/// Stable external shape of a sensitivity report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub created_at: jiff::Timestamp,
    pub rows: usize,
    pub targets: Vec<TargetRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,
}

impl From<&SensitivityReport> for ReportDocument {
    fn from(report: &SensitivityReport) -> Self {
        let targets = report
            .targets
            .iter()
            .map(|t| TargetRecord {
                target: t.target.clone(),
                r_squared: t.r_squared,
                lae_pct: t.lae_pct,
                entries: t
                    .entries
                    .iter()
                    .map(|e| EntryRecord {
                        parameter: e.parameter.clone(),
                        sensitivity_pct: e.sensitivity_pct,
                        ci: e.confidence_interval.map(|(lo, hi)| [lo, hi]),
                    })
                    .collect(),
                significant_parameters: t.significant_parameters.clone(),
                warnings: t.warnings.iter().map(|w| w.message(&t.target)).collect(),
            })
            .collect();

        let failures = report
            .failures
            .iter()
            .map(|f| FailureRecord {
                target: f.target.clone(),
                error: f.error.to_string(),
            })
            .collect();

        Self {
            created_at: report.created_at,
            rows: report.rows,
            targets,
            failures,
        }
    }
}

/// Writes and reads matrices and reports. Performs no computation.
#[derive(Debug, Clone, Default)]
pub struct ReportExporter {
    delimiter: Delimiter,
    precision: Option<usize>,
}

impl ReportExporter {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            precision: None,
        }
    }

    /// Fixed number of decimals; by default values round-trip exactly
    #[must_use]
    pub fn with_precision(mut self, decimals: usize) -> Self {
        self.precision = Some(decimals);
        self
    }

    fn format_value(&self, value: f64) -> String {
        match self.precision {
            Some(decimals) => format!("{value:.decimals$}"),
            None => format!("{value}"),
        }
    }

    /// Write one matrix with a header row
    pub fn write_matrix<W: Write>(
        &self,
        writer: W,
        names: &[String],
        matrix: &DMatrix<f64>,
    ) -> Result<(), ExportError> {
        if names.len() != matrix.ncols() {
            return Err(ExportError::Parse {
                line: 1,
                message: format!("{} names for {} columns", names.len(), matrix.ncols()),
            });
        }

        let rows: Vec<Vec<String>> = matrix
            .row_iter()
            .map(|row| row.iter().map(|&v| self.format_value(v)).collect())
            .collect();

        match self.delimiter {
            Delimiter::Comma => {
                let mut csv = csv::Writer::from_writer(writer);
                csv.write_record(names)?;
                for row in &rows {
                    csv.write_record(row)?;
                }
                csv.flush()?;
            }
            Delimiter::Whitespace => write_aligned(writer, names, &rows)?,
        }
        Ok(())
    }

    /// Write `parameters.txt` and `targets.txt` into `dir`
    pub fn write_design(
        &self,
        dir: impl AsRef<Path>,
        design: &DesignMatrix,
    ) -> Result<(PathBuf, PathBuf), ExportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let parameters = dir.join(PARAMETERS_FILE);
        let targets = dir.join(TARGETS_FILE);

        self.write_matrix(
            fs::File::create(&parameters)?,
            design.parameter_names(),
            design.parameters(),
        )?;
        self.write_matrix(
            fs::File::create(&targets)?,
            design.target_names(),
            design.targets(),
        )?;

        info!(
            rows = design.nrows(),
            dir = %dir.display(),
            "design matrix exported"
        );
        Ok((parameters, targets))
    }

    /// Read a matrix file as `(names, rows)`.
    ///
    /// The header row decides the format: a comma or a leading quote means
    /// CSV, anything else the aligned whitespace layout.
    pub fn read_matrix<R: BufRead>(mut reader: R) -> Result<(Vec<String>, Vec<Vec<f64>>), ExportError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        let header = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .ok_or(ExportError::MissingHeader)?;

        if header.contains(',') || header.starts_with('"') {
            read_delimited(&text)
        } else {
            read_aligned(&text)
        }
    }

    pub fn read_matrix_file(path: impl AsRef<Path>) -> Result<(Vec<String>, Vec<Vec<f64>>), ExportError> {
        Self::read_matrix(BufReader::new(fs::File::open(path)?))
    }

    /// Load a design from a parameter file and a target file of the same run
    pub fn read_design_files(
        parameters: impl AsRef<Path>,
        targets: impl AsRef<Path>,
    ) -> Result<DesignMatrix, ExportError> {
        let (parameter_names, parameter_rows) = Self::read_matrix_file(parameters)?;
        let (target_names, target_rows) = Self::read_matrix_file(targets)?;
        Ok(DesignMatrix::from_rows(
            parameter_names,
            &parameter_rows,
            target_names,
            &target_rows,
        )?)
    }

    /// Load `parameters.txt` and `targets.txt` from `dir`
    pub fn read_design(dir: impl AsRef<Path>) -> Result<DesignMatrix, ExportError> {
        let dir = dir.as_ref();
        Self::read_design_files(dir.join(PARAMETERS_FILE), dir.join(TARGETS_FILE))
    }

    pub fn report_to_yaml(report: &SensitivityReport) -> Result<String, ExportError> {
        serde_saphyr::to_string(&ReportDocument::from(report))
            .map_err(|e| ExportError::Yaml(e.to_string()))
    }

    pub fn report_from_yaml(yaml: &str) -> Result<ReportDocument, ExportError> {
        serde_saphyr::from_str(yaml).map_err(|e| ExportError::Yaml(e.to_string()))
    }

    /// The full report, every field included
    pub fn report_to_json(report: &SensitivityReport) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    pub fn report_from_json(json: &str) -> Result<SensitivityReport, ExportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write a report, choosing JSON for `.json` paths and YAML otherwise
    pub fn write_report(path: impl AsRef<Path>, report: &SensitivityReport) -> Result<(), ExportError> {
        let path = path.as_ref();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::report_to_json(report)?,
            _ => Self::report_to_yaml(report)?,
        };
        fs::write(path, text)?;
        info!(path = %path.display(), targets = report.targets.len(), "report written");
        Ok(())
    }

    pub fn summary_to_yaml(summary: &EnsembleSummary) -> Result<String, ExportError> {
        serde_saphyr::to_string(summary).map_err(|e| ExportError::Yaml(e.to_string()))
    }

    pub fn oat_report_to_yaml(report: &OatReport) -> Result<String, ExportError> {
        serde_saphyr::to_string(report).map_err(|e| ExportError::Yaml(e.to_string()))
    }
}

fn parse_value(field: &str, line: usize) -> Result<f64, ExportError> {
    field.parse::<f64>().map_err(|e| ExportError::Parse {
        line,
        message: format!("`{field}` is not a number ({e})"),
    })
}

fn check_width(values: &[f64], names: &[String], line: usize) -> Result<(), ExportError> {
    if values.len() != names.len() {
        return Err(ExportError::Parse {
            line,
            message: format!("expected {} values, found {}", names.len(), values.len()),
        });
    }
    Ok(())
}

fn read_delimited(text: &str) -> Result<(Vec<String>, Vec<Vec<f64>>), ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line() as usize);
        let values = record
            .iter()
            .map(|field| parse_value(field, line))
            .collect::<Result<Vec<f64>, _>>()?;
        check_width(&values, &names, line)?;
        rows.push(values);
    }
    Ok((names, rows))
}

fn read_aligned(text: &str) -> Result<(Vec<String>, Vec<Vec<f64>>), ExportError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

    let (_, header) = lines.next().ok_or(ExportError::MissingHeader)?;
    let names: Vec<String> = header.split_whitespace().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        let values = line
            .split_whitespace()
            .map(|field| parse_value(field, line_no))
            .collect::<Result<Vec<f64>, _>>()?;
        check_width(&values, &names, line_no)?;
        rows.push(values);
    }
    Ok((names, rows))
}

fn write_aligned<W: Write>(mut writer: W, names: &[String], rows: &[Vec<String>]) -> Result<(), ExportError> {
    let unaligned = |c: char| c.is_whitespace() || c == ',' || c == '"';
    if let Some(bad) = names.iter().find(|n| n.is_empty() || n.chars().any(unaligned)) {
        return Err(ExportError::Parse {
            line: 1,
            message: format!(
                "column name `{bad}` cannot be written to a whitespace-delimited file; use the comma delimiter"
            ),
        });
    }

    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            rows.iter()
                .map(|row| row[j].len())
                .fold(name.len(), usize::max)
        })
        .collect();

    write_cells(&mut writer, names, &widths)?;
    for row in rows {
        write_cells(&mut writer, row, &widths)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_cells<W: Write>(writer: &mut W, cells: &[String], widths: &[usize]) -> std::io::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(writer, "{}", line.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_accepts_comments_and_both_delimiters() {
        let text = "# parameters.txt\nmotor_thrust  dry_mass\n1723.4  15.87\n\n# note\n1680.1  16.02\n";
        let (names, rows) = ReportExporter::read_matrix(text.as_bytes()).unwrap();
        assert_eq!(names, vec!["motor_thrust".to_string(), "dry_mass".to_string()]);
        assert_eq!(rows, vec![vec![1723.4, 15.87], vec![1680.1, 16.02]]);

        let csv = "apogee_m, max_velocity_ms\n2299.94,240.72\n";
        let (names, rows) = ReportExporter::read_matrix(csv.as_bytes()).unwrap();
        assert_eq!(names[1], "max_velocity_ms");
        assert_eq!(rows[0], vec![2299.94, 240.72]);
    }

    #[test]
    fn test_reader_reports_bad_lines() {
        let text = "a b\n1 2\n3\n";
        match ReportExporter::read_matrix(text.as_bytes()) {
            Err(ExportError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            ReportExporter::read_matrix("# only a comment\n".as_bytes()),
            Err(ExportError::MissingHeader)
        ));
        assert!(matches!(
            ReportExporter::read_matrix("a\nnot-a-number\n".as_bytes()),
            Err(ExportError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_aligned_output_layout() {
        let names = vec!["motor_thrust".to_string(), "m".to_string()];
        let matrix = DMatrix::from_row_slice(2, 2, &[1723.4, 15.87, 1680.1, 16.0]);
        let mut out = Vec::new();
        ReportExporter::default()
            .write_matrix(&mut out, &names, &matrix)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "motor_thrust  m");
        assert_eq!(lines[1], "1723.4        15.87");
        assert_eq!(lines[2], "1680.1        16");
    }

    #[test]
    fn test_quoted_csv_header_round_trip() {
        let names = vec!["thrust,kN".to_string(), "mass \"dry\"".to_string()];
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.5, -4.25]);
        let mut out = Vec::new();
        ReportExporter::new(Delimiter::Comma)
            .write_matrix(&mut out, &names, &matrix)
            .unwrap();
        assert!(String::from_utf8(out.clone()).unwrap().starts_with("\"thrust,kN\""));

        let (read_names, rows) = ReportExporter::read_matrix(out.as_slice()).unwrap();
        assert_eq!(read_names, names);
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.5, -4.25]]);
    }

    #[test]
    fn test_csv_reader_skips_comments_and_reports_lines() {
        let text = "# exported by a previous run\n\"a\",b\n1,2\n# midway note\n3,4\n";
        let (names, rows) = ReportExporter::read_matrix(text.as_bytes()).unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let text = "# exported by a previous run\n\"a\",b\n1,2\n3\n";
        match ReportExporter::read_matrix(text.as_bytes()) {
            Err(ExportError::Parse { line, message }) => {
                assert_eq!(line, 4);
                assert!(message.contains("expected 2 values, found 1"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let (names, rows) = ReportExporter::read_matrix("\"dry mass\"\n15.9\n".as_bytes()).unwrap();
        assert_eq!(names, vec!["dry mass".to_string()]);
        assert_eq!(rows, vec![vec![15.9]]);
    }

    #[test]
    fn test_aligned_writer_rejects_delimiter_characters() {
        let matrix = DMatrix::from_row_slice(1, 1, &[1.0]);
        for name in ["thrust,kN", "\"quoted\""] {
            let mut out = Vec::new();
            assert!(
                ReportExporter::default()
                    .write_matrix(&mut out, &[name.to_string()], &matrix)
                    .is_err(),
                "{name}"
            );
        }
    }

    #[test]
    fn test_whitespace_names_rejected() {
        let names = vec!["dry mass".to_string()];
        let matrix = DMatrix::from_row_slice(1, 1, &[1.0]);
        let mut out = Vec::new();
        assert!(
            ReportExporter::default()
                .write_matrix(&mut out, &names, &matrix)
                .is_err()
        );
        assert!(
            ReportExporter::new(Delimiter::Comma)
                .write_matrix(&mut out, &names, &matrix)
                .is_ok()
        );
    }
}
