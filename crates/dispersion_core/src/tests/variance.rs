//! Tests for the variance-based sensitivity analysis
//!
//! These tests verify that:
//! - A known linear response is ranked and decomposed correctly
//! - Sensitivities and the LAE always close to 100%
//! - Degenerate parameters and targets are reported, not fitted
//! - Exclusions, target selection and bootstrap intervals behave as configured
//! - The analysis runs end to end on an ensemble of the toy flight model

use crate::analysis::{VarianceAnalysisConfig, VarianceAnalyzer};
use crate::config::EnsembleConfig;
use crate::design::DesignMatrix;
use crate::ensemble::EnsembleRunner;
use crate::error::{AnalysisError, DegenerateInputError};
use crate::model::{ModelValidityWarning, ParameterSpec};
use crate::sampling::sample;
use crate::tests::{flight, flight_specs, init_test_logging};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// `y = 2 x1 - x2 + 0 x3 + 0.3 e` over standard normal inputs
fn linear_design(rows: usize, seed: u64) -> DesignMatrix {
    let specs = vec![
        ParameterSpec::normal("x1", 0.0, 1.0),
        ParameterSpec::normal("x2", 0.0, 1.0),
        ParameterSpec::normal("x3", 0.0, 1.0),
        ParameterSpec::normal("noise", 0.0, 1.0),
    ];
    let sets = sample(&specs, rows, seed).unwrap();
    let parameters: Vec<Vec<f64>> = sets.iter().map(|s| s.values()[..3].to_vec()).collect();
    let targets: Vec<Vec<f64>> = sets
        .iter()
        .map(|s| {
            let v = s.values();
            vec![2.0 * v[0] - v[1] + 0.3 * v[3]]
        })
        .collect();
    DesignMatrix::from_rows(names(&["x1", "x2", "x3"]), &parameters, names(&["y"]), &targets)
        .unwrap()
}

fn no_bootstrap() -> VarianceAnalysisConfig {
    VarianceAnalysisConfig {
        bootstrap_replicates: 0,
        ..Default::default()
    }
}

/// Test that a known linear response is ranked and decomposed correctly
#[test]
fn test_known_linear_response() {
    init_test_logging();
    let design = linear_design(500, 42);
    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    assert!(report.is_complete());

    let y = report.target("y").unwrap();
    assert_eq!(y.ranking(), vec!["x1", "x2", "x3"]);
    assert!(y.is_significant("x1"));
    assert!(y.is_significant("x2"));
    assert!(!y.is_significant("x3"));
    assert!(y.lae_pct < 15.0);

    // Expected shares: 4 / 5.09 and 1 / 5.09 of the variance
    assert!((y.sensitivity("x1").unwrap() - 78.6).abs() < 5.0);
    assert!((y.sensitivity("x2").unwrap() - 19.6).abs() < 5.0);
    assert!(y.sensitivity("x3").unwrap() < 1.0);

    // Coefficients in original units recover the generating model
    assert!((y.entry("x1").unwrap().coefficient - 2.0).abs() < 0.06);
    assert!((y.entry("x2").unwrap().coefficient + 1.0).abs() < 0.06);
    assert!(y.entry("x3").unwrap().coefficient.abs() < 0.06);

    assert!(y.ols_r_squared > 0.95);
    assert!(y.bootstrap.is_none());
    assert!(y.entries.iter().all(|e| e.confidence_interval.is_none()));
}

/// Test that sensitivities and the LAE sum to 100
#[test]
fn test_decomposition_closes() {
    let report = VarianceAnalyzer::new(no_bootstrap())
        .fit(&linear_design(200, 7))
        .unwrap();
    let y = report.target("y").unwrap();

    assert!((y.closure_pct() - 100.0).abs() < 1e-9);
    assert!((y.lae_pct - 100.0 * (1.0 - y.r_squared)).abs() < 1e-9);
    assert!(y.entries.iter().all(|e| e.sensitivity_pct >= 0.0));
}

/// Test that a strongly non-linear response is flagged and nothing is significant
#[test]
fn test_non_linear_response_is_flagged() {
    let specs = vec![
        ParameterSpec::uniform("x1", -1.0, 1.0),
        ParameterSpec::uniform("x2", -1.0, 1.0),
    ];
    let sets = sample(&specs, 400, 3).unwrap();
    let parameters: Vec<Vec<f64>> = sets.iter().map(|s| s.values().to_vec()).collect();
    let targets: Vec<Vec<f64>> = sets
        .iter()
        .map(|s| vec![s.values()[0].powi(2) + 0.1 * s.values()[1]])
        .collect();
    let design =
        DesignMatrix::from_rows(names(&["x1", "x2"]), &parameters, names(&["y"]), &targets)
            .unwrap();

    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    let y = report.target("y").unwrap();

    assert!(y.lae_pct > 80.0);
    assert!(y.significant_parameters.is_empty());
    assert!(
        y.warnings
            .iter()
            .any(|w| matches!(w, ModelValidityWarning::LinearApproximationPoor { .. }))
    );
}

/// Test that a zero-variance parameter fails every target, but the report is still produced
#[test]
fn test_constant_parameter_fails_every_target() {
    let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 5.0]).collect();
    let targets: Vec<Vec<f64>> = (0..20)
        .map(|i| vec![3.0 * i as f64, (i as f64).sqrt()])
        .collect();
    let design = DesignMatrix::from_rows(
        names(&["thrust", "fixed"]),
        &rows,
        names(&["apogee", "flight_time"]),
        &targets,
    )
    .unwrap();

    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    assert!(report.targets.is_empty());
    assert!(!report.is_complete());
    for target in ["apogee", "flight_time"] {
        match report.failure(target) {
            Some(DegenerateInputError::ConstantParameter { parameter, rows }) => {
                assert_eq!(parameter, "fixed");
                assert_eq!(*rows, 20);
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    // Excluding the constant parameter makes the design usable
    let config = VarianceAnalysisConfig {
        excluded_parameters: names(&["fixed"]),
        ..no_bootstrap()
    };
    let report = VarianceAnalyzer::new(config).fit(&design).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.parameters, names(&["thrust"]));
    assert_eq!(report.excluded_parameters, names(&["fixed"]));
    assert!((report.target("apogee").unwrap().sensitivity("thrust").unwrap() - 100.0).abs() < 1e-6);
}

/// Test that a constant target fails alone
#[test]
fn test_constant_target_fails_alone() {
    let design = linear_design(100, 1);
    let rows: Vec<Vec<f64>> = (0..100)
        .map(|i| design.parameters().row(i).iter().copied().collect())
        .collect();
    let targets: Vec<Vec<f64>> = (0..100)
        .map(|i| vec![design.targets()[(i, 0)], 3.0])
        .collect();
    let design = DesignMatrix::from_rows(
        names(&["x1", "x2", "x3"]),
        &rows,
        names(&["y", "stage_count"]),
        &targets,
    )
    .unwrap();

    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    assert!(report.target("y").is_some());
    assert!(matches!(
        report.failure("stage_count"),
        Some(DegenerateInputError::ConstantTarget { rows: 100, .. })
    ));
    assert!(report.failure("y").is_none());
}

/// Test that perfectly collinear parameters are rejected with a removal suggestion
#[test]
fn test_collinear_parameters_name_a_removal() {
    let sets = sample(
        &[
            ParameterSpec::normal("mass", 16.0, 0.2),
            ParameterSpec::normal("wind", 3.0, 1.0),
        ],
        50,
        9,
    )
    .unwrap();
    let rows: Vec<Vec<f64>> = sets
        .iter()
        .map(|s| {
            let v = s.values();
            vec![v[0], v[1], 2.0 * v[0]]
        })
        .collect();
    let targets: Vec<Vec<f64>> = sets.iter().map(|s| vec![s.values()[0] + s.values()[1]]).collect();
    let design = DesignMatrix::from_rows(
        names(&["mass", "wind", "mass_doubled"]),
        &rows,
        names(&["apogee"]),
        &targets,
    )
    .unwrap();

    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    match report.failure("apogee") {
        Some(DegenerateInputError::Collinear {
            parameters,
            suggested_removal,
            ..
        }) => {
            assert!(parameters.contains(&"mass".to_string()));
            assert!(parameters.contains(&"mass_doubled".to_string()));
            assert!(!parameters.contains(&"wind".to_string()));
            assert_eq!(suggested_removal, "mass_doubled");
        }
        other => panic!("unexpected failure {other:?}"),
    }
    let message = report.failure("apogee").unwrap().to_string();
    assert!(message.contains("remove collinear parameter `mass_doubled`"));
}

/// Test that too few rows for the parameter count is reported per target
#[test]
fn test_too_few_rows() {
    let design = DesignMatrix::from_rows(
        names(&["a", "b"]),
        &[vec![1.0, 2.0], vec![2.0, 1.0], vec![3.0, 5.0]],
        names(&["y"]),
        &[vec![1.0], vec![2.0], vec![4.0]],
    )
    .unwrap();
    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    assert!(matches!(
        report.failure("y"),
        Some(DegenerateInputError::TooFewRows {
            rows: 3,
            parameters: 2
        })
    ));
}

/// Test configuration errors that prevent any report
#[test]
fn test_exclusion_errors() {
    let design = linear_design(50, 2);

    let unknown = VarianceAnalysisConfig {
        excluded_parameters: names(&["wind"]),
        ..no_bootstrap()
    };
    assert_eq!(
        VarianceAnalyzer::new(unknown).fit(&design).unwrap_err(),
        AnalysisError::UnknownExcludedParameter("wind".to_string())
    );

    let everything = VarianceAnalysisConfig {
        excluded_parameters: names(&["x1", "x2", "x3"]),
        ..no_bootstrap()
    };
    assert_eq!(
        VarianceAnalyzer::new(everything).fit(&design).unwrap_err(),
        AnalysisError::NoParametersLeft
    );

    let bad_level = VarianceAnalysisConfig {
        confidence_level: 1.5,
        ..no_bootstrap()
    };
    assert!(matches!(
        VarianceAnalyzer::new(bad_level).fit(&design),
        Err(AnalysisError::InvalidConfig(_))
    ));
}

/// Test that bootstrap intervals bracket the point estimates and are reproducible
#[test]
fn test_bootstrap_intervals() {
    let design = linear_design(300, 5);
    let config = VarianceAnalysisConfig {
        bootstrap_replicates: 100,
        bootstrap_seed: 17,
        ..Default::default()
    };
    let first = VarianceAnalyzer::new(config.clone()).fit(&design).unwrap();
    let second = VarianceAnalyzer::new(config).fit(&design).unwrap();
    assert_eq!(first.targets, second.targets);

    let y = first.target("y").unwrap();
    let summary = y.bootstrap.as_ref().unwrap();
    assert_eq!(summary.replicates, 100);
    assert_eq!(summary.used, 100);
    assert_eq!(summary.seed, 17);

    for entry in &y.entries {
        let (lo, hi) = entry.confidence_interval.unwrap();
        assert!(lo <= hi);
        if entry.significant {
            assert!(lo <= entry.sensitivity_pct && entry.sensitivity_pct <= hi);
        }
    }
}

/// Test that target selection restricts and orders the report
#[test]
fn test_target_selection() {
    let sets = sample(&flight_specs(), 200, 4).unwrap();
    let rows: Vec<Vec<f64>> = sets.iter().map(|s| s.values().to_vec()).collect();
    let targets: Vec<Vec<f64>> = sets
        .iter()
        .map(|s| {
            let out = flight(s).unwrap();
            vec![out["apex_m"], out["range_m"]]
        })
        .collect();
    let names_p: Vec<String> = flight_specs().into_iter().map(|s| s.name).collect();
    let design =
        DesignMatrix::from_rows(names_p, &rows, names(&["apex_m", "range_m"]), &targets).unwrap();

    let config = VarianceAnalysisConfig {
        targets: names(&["range_m"]),
        ..no_bootstrap()
    };
    let report = VarianceAnalyzer::new(config).fit(&design).unwrap();
    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.targets[0].target, "range_m");

    let config = VarianceAnalysisConfig {
        targets: names(&["max_q"]),
        ..no_bootstrap()
    };
    assert!(matches!(
        VarianceAnalyzer::new(config).fit(&design),
        Err(AnalysisError::Design(_))
    ));
}

/// Test the full pipeline: ensemble, design matrix, decomposition
#[test]
fn test_ensemble_to_sensitivity() {
    init_test_logging();
    let run = EnsembleRunner::new(EnsembleConfig {
        trials: 400,
        seed: 42,
        max_workers: 4,
        ..Default::default()
    })
    .run(&flight_specs(), || flight)
    .unwrap();

    let design = run.design_matrix().unwrap();
    assert_eq!(design.nrows(), 400);
    assert_eq!(design.target_names(), &names(&["apex_m", "range_m"])[..]);

    let report = VarianceAnalyzer::new(no_bootstrap()).fit(&design).unwrap();
    assert!(report.is_complete());

    // Apex height is driven by the launch angle, range by the launch speed
    let apex = report.target("apex_m").unwrap();
    assert_eq!(apex.ranking()[0], "launch_angle_deg");
    let range = report.target("range_m").unwrap();
    assert_eq!(range.ranking()[0], "launch_speed");
    assert_eq!(range.ranking()[1], "drag_factor");

    for target in &report.targets {
        assert!((target.closure_pct() - 100.0).abs() < 1e-9);
    }
}
