//! Tests for parameter sampling
//!
//! These tests verify that:
//! - Draws respect the support of bounded distributions
//! - The same seed reproduces the same parameter sets
//! - Each parameter's draws depend only on its position, not on its neighbours

use crate::model::{Distribution, ParameterSpec};
use crate::sampling::{ParameterSampler, sample};
use crate::stats::{mean, sample_std_dev};

/// Test that truncated-normal draws never leave the bounds and are not clipped onto them
#[test]
fn test_truncated_normal_stays_inside_bounds() {
    let spec = ParameterSpec::truncated_normal("dry_mass", 16.0, 1.0, 15.5, 16.5);
    let draws = ParameterSampler::new(11).sample_column(0, &spec, 5_000).unwrap();

    assert!(draws.iter().all(|x| (15.5..=16.5).contains(x)));
    // Rejection sampling produces no mass exactly at the bounds
    assert!(!draws.iter().any(|&x| x == 15.5 || x == 16.5));
}

/// Test that every bounded distribution stays within its support
#[test]
fn test_bounded_distributions_respect_support() {
    let specs = vec![
        ParameterSpec::uniform("u", -2.0, 3.0),
        ParameterSpec::triangular("t", 0.0, 10.0, 2.0),
        ParameterSpec::log_normal("l", 0.0, 0.5),
    ];
    let sets = sample(&specs, 2_000, 5).unwrap();

    for set in &sets {
        assert!((-2.0..=3.0).contains(&set.get("u").unwrap()));
        assert!((0.0..=10.0).contains(&set.get("t").unwrap()));
        assert!(set.get("l").unwrap() > 0.0);
    }
}

/// Test that normal draws reproduce the requested moments
#[test]
fn test_normal_moments() {
    let spec = ParameterSpec::normal("thrust", 1700.0, 35.0);
    let draws = ParameterSampler::new(2).sample_column(0, &spec, 20_000).unwrap();

    assert!((mean(&draws) - 1700.0).abs() < 1.5);
    assert!((sample_std_dev(&draws) - 35.0).abs() < 1.5);
}

/// Test that the same seed reproduces identical parameter sets
#[test]
fn test_same_seed_same_samples() {
    let specs = crate::tests::flight_specs();
    let a = sample(&specs, 100, 42).unwrap();
    let b = sample(&specs, 100, 42).unwrap();
    let c = sample(&specs, 100, 43).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

/// Test that growing the sample count only appends new draws
#[test]
fn test_longer_run_extends_shorter_run() {
    let specs = crate::tests::flight_specs();
    let short = sample(&specs, 50, 9).unwrap();
    let long = sample(&specs, 200, 9).unwrap();

    assert_eq!(&long[..50], &short[..]);
}

/// Test that appending a parameter leaves earlier columns untouched
#[test]
fn test_appending_a_parameter_keeps_existing_draws() {
    let mut specs = vec![
        ParameterSpec::normal("a", 0.0, 1.0),
        ParameterSpec::uniform("b", 0.0, 1.0),
    ];
    let before = sample(&specs, 64, 3).unwrap();
    specs.push(ParameterSpec::normal("c", 5.0, 2.0));
    let after = sample(&specs, 64, 3).unwrap();

    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.get("a"), new.get("a"));
        assert_eq!(old.get("b"), new.get("b"));
        assert!(new.get("c").is_some());
    }
}

/// Test that parameter sets keep declaration order and share their names
#[test]
fn test_parameter_sets_follow_declaration_order() {
    let specs = crate::tests::flight_specs();
    let sets = sample(&specs, 3, 1).unwrap();

    let expected: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    for set in &sets {
        let names: Vec<&str> = set.names().iter().map(String::as_str).collect();
        assert_eq!(names, expected);
        assert!(std::sync::Arc::ptr_eq(
            set.shared_names(),
            sets[0].shared_names()
        ));
    }
}

/// Test that specs deserialize from a tagged YAML mapping
#[test]
fn test_parameter_spec_from_yaml() {
    let yaml = r#"
name: wind_speed
distribution:
  type: Triangular
  min: 0.0
  max: 8.0
  mode: 3.0
"#;
    let spec: ParameterSpec = serde_saphyr::from_str(yaml).unwrap();
    assert_eq!(
        spec.distribution,
        Distribution::Triangular {
            min: 0.0,
            max: 8.0,
            mode: 3.0
        }
    );
    assert_eq!(spec.nominal(), 3.0);
}
