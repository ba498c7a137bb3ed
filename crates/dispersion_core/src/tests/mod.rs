//! Integration tests for the dispersion engine
//!
//! Tests are organized by topic:
//! - `sampling` - Distributions, truncation and seed determinism
//! - `ensemble` - Parallel execution, failure isolation, deadlines and aborts
//! - `variance` - Regression-based sensitivity decomposition
//! - `oat` - One-at-a-time finite differences
//! - `export` - Matrix files and report serialization
//! - `config` - YAML study configuration and the builder DSL

mod sampling;
mod variance;

use crate::error::SimulationError;
use crate::model::{Outputs, ParameterSet, ParameterSpec};

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Inputs of the toy ballistic model
pub(crate) fn flight_specs() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::normal("launch_speed", 120.0, 4.0),
        ParameterSpec::uniform("launch_angle_deg", 40.0, 50.0),
        ParameterSpec::truncated_normal("drag_factor", 1.0, 0.05, 0.9, 1.1),
    ]
}

/// Drag-scaled vacuum trajectory: range and apex height in metres
pub(crate) fn flight(p: &ParameterSet) -> Result<Outputs, SimulationError> {
    const G: f64 = 9.81;
    let speed = p
        .get("launch_speed")
        .ok_or_else(|| SimulationError::new("missing launch_speed"))?;
    let angle = p
        .get("launch_angle_deg")
        .ok_or_else(|| SimulationError::new("missing launch_angle_deg"))?
        .to_radians();
    let drag = p
        .get("drag_factor")
        .ok_or_else(|| SimulationError::new("missing drag_factor"))?;

    let range = speed * speed * (2.0 * angle).sin() / G / drag;
    let apex = (speed * angle.sin()).powi(2) / (2.0 * G) / drag;
    Ok(Outputs::from([
        ("range_m".to_string(), range),
        ("apex_m".to_string(), apex),
    ]))
}
