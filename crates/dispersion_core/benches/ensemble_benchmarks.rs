//! Criterion benchmarks for dispersion_core
//!
//! Run with: cargo bench -p dispersion_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dispersion_core::analysis::{VarianceAnalysisConfig, VarianceAnalyzer};
use dispersion_core::config::EnsembleConfig;
use dispersion_core::ensemble::EnsembleRunner;
use dispersion_core::error::SimulationError;
use dispersion_core::model::{Outputs, ParameterSet, ParameterSpec};
use dispersion_core::oat::OatAnalyzer;
use dispersion_core::sampling::ParameterSampler;

fn specs() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::normal("motor_thrust", 1700.0, 35.0),
        ParameterSpec::truncated_normal("dry_mass", 16.0, 0.2, 15.5, 16.5),
        ParameterSpec::uniform("wind_speed", 0.0, 8.0),
        ParameterSpec::triangular("drag_coefficient", 0.40, 0.55, 0.45),
        ParameterSpec::log_normal("launch_rail_friction", -3.0, 0.25),
    ]
}

/// Cheap closed-form stand-in for a trajectory integrator
fn ascent(p: &ParameterSet) -> Result<Outputs, SimulationError> {
    let get = |name: &str| {
        p.get(name)
            .ok_or_else(|| SimulationError::new(format!("missing {name}")))
    };
    let thrust = get("motor_thrust")?;
    let mass = get("dry_mass")?;
    let wind = get("wind_speed")?;
    let cd = get("drag_coefficient")?;
    let friction = get("launch_rail_friction")?;

    let burnout_velocity = (thrust / mass - 9.81) * 1.8 * (1.0 - friction);
    let apogee = burnout_velocity.powi(2) / (2.0 * 9.81 * (1.0 + 4.0 * cd));
    let drift = wind * (2.0 * apogee / 9.81).sqrt();
    Ok(Outputs::from([
        ("apogee_m".to_string(), apogee),
        ("max_velocity_ms".to_string(), burnout_velocity),
        ("drift_m".to_string(), drift),
    ]))
}

fn ensemble_config(trials: usize) -> EnsembleConfig {
    EnsembleConfig {
        trials,
        seed: 42,
        ..Default::default()
    }
}

fn bench_sampling(c: &mut Criterion) {
    let specs = specs();
    let sampler = ParameterSampler::new(42);

    c.bench_function("sample_10k_sets", |b| {
        b.iter(|| sampler.sample(black_box(&specs), black_box(10_000)))
    });
}

fn bench_ensemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble");
    let specs = specs();

    for trials in [100, 1_000, 5_000].iter() {
        let runner = EnsembleRunner::new(ensemble_config(*trials));
        group.bench_with_input(BenchmarkId::new("trials", trials), trials, |b, _| {
            b.iter(|| runner.run(black_box(&specs), || ascent))
        });
    }

    group.finish();
}

fn bench_variance_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("variance_fit");
    group.sample_size(20);

    let design = EnsembleRunner::new(ensemble_config(2_000))
        .run(&specs(), || ascent)
        .expect("ensemble should run")
        .design_matrix()
        .expect("ensemble should produce a design");

    for replicates in [0usize, 100].iter() {
        let analyzer = VarianceAnalyzer::new(VarianceAnalysisConfig {
            bootstrap_replicates: *replicates,
            ..Default::default()
        });
        group.bench_with_input(
            BenchmarkId::new("bootstrap_replicates", replicates),
            replicates,
            |b, _| b.iter(|| analyzer.fit(black_box(&design))),
        );
    }

    group.finish();
}

fn bench_oat(c: &mut Criterion) {
    let specs = specs();
    let analyzer = OatAnalyzer::default();

    c.bench_function("oat_five_parameters", |b| {
        b.iter(|| {
            let mut sim = ascent;
            analyzer.run_at_nominal(black_box(&specs), &mut sim)
        })
    });
}

criterion_group!(
    benches,
    bench_sampling,
    bench_ensemble,
    bench_variance_fit,
    bench_oat,
);
criterion_main!(benches);
