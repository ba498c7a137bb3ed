//! One-at-a-time local sensitivity
//!
//! Central finite differences around a nominal point. Each varied parameter
//! is moved by `±f·x_j` with every other input held fixed, for a total of
//! `2P + 1` simulator calls. The result is local and additive by construction;
//! the report carries those limitations with it.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::OatConfig;
use crate::error::OatError;
use crate::model::{OatLimitations, OatReport, OatSensitivity, Outputs, ParameterSet, ParameterSpec};
use crate::simulator::Simulator;

/// Finite-difference sensitivity analyzer, independent of the ensemble runner
#[derive(Debug, Clone)]
pub struct OatAnalyzer {
    perturbation_fraction: f64,
}

impl Default for OatAnalyzer {
    fn default() -> Self {
        Self::from_config(&OatConfig::default())
    }
}

impl OatAnalyzer {
    pub fn new(perturbation_fraction: f64) -> Self {
        Self {
            perturbation_fraction,
        }
    }

    pub fn from_config(config: &OatConfig) -> Self {
        Self::new(config.perturbation_fraction)
    }

    pub fn perturbation_fraction(&self) -> f64 {
        self.perturbation_fraction
    }

    /// Perturb every specified parameter around `nominal`.
    ///
    /// `nominal` may carry extra fixed inputs that are passed through
    /// unchanged. All inputs are validated before the first simulator call.
    pub fn run<S: Simulator + ?Sized>(
        &self,
        specs: &[ParameterSpec],
        nominal: &ParameterSet,
        simulator: &mut S,
    ) -> Result<OatReport, OatError> {
        let f = self.perturbation_fraction;
        if !(f.is_finite() && f > 0.0 && f < 1.0) {
            return Err(OatError::InvalidPerturbation(f));
        }

        let mut points = Vec::with_capacity(specs.len());
        for spec in specs {
            let x = nominal
                .get(&spec.name)
                .ok_or_else(|| OatError::MissingNominal {
                    parameter: spec.name.clone(),
                })?;
            if x == 0.0 {
                return Err(OatError::ZeroNominal {
                    parameter: spec.name.clone(),
                });
            }
            let plus = nominal.with_value(&spec.name, x * (1.0 + f));
            let minus = nominal.with_value(&spec.name, x * (1.0 - f));
            let (Some(plus), Some(minus)) = (plus, minus) else {
                return Err(OatError::MissingNominal {
                    parameter: spec.name.clone(),
                });
            };
            points.push((spec.name.as_str(), x, plus, minus));
        }

        info!(
            parameters = specs.len(),
            calls = 2 * specs.len() + 1,
            perturbation_fraction = f,
            "starting one-at-a-time analysis"
        );

        let mut calls = 0;
        let y0 = evaluate(simulator, nominal, "the nominal point", &mut calls)?;
        if y0.is_empty() {
            return Err(OatError::NoOutputs);
        }

        let mut sensitivities = BTreeMap::new();
        for (name, x, plus, minus) in points {
            let y_plus = evaluate(simulator, &plus, &format!("{name} +{f}"), &mut calls)?;
            let y_minus = evaluate(simulator, &minus, &format!("{name} -{f}"), &mut calls)?;

            let step = f * x;
            let by_target = y0
                .iter()
                .map(|(target, &nominal_output)| {
                    let plus_output = lookup(&y_plus, target, name, "+", f)?;
                    let minus_output = lookup(&y_minus, target, name, "-", f)?;
                    let derivative = (plus_output - minus_output) / (2.0 * step);
                    let normalized =
                        (nominal_output != 0.0).then(|| derivative * x / nominal_output);
                    Ok((
                        target.clone(),
                        OatSensitivity {
                            parameter: name.to_string(),
                            target: target.clone(),
                            nominal_value: x,
                            step,
                            nominal_output,
                            plus_output,
                            minus_output,
                            derivative,
                            normalized,
                        },
                    ))
                })
                .collect::<Result<BTreeMap<_, _>, OatError>>()?;
            sensitivities.insert(name.to_string(), by_target);
        }

        debug!(calls, "one-at-a-time analysis complete");

        Ok(OatReport {
            perturbation_fraction: f,
            nominal: nominal.clone(),
            nominal_outputs: y0,
            sensitivities,
            simulator_calls: calls,
            limitations: OatLimitations::default(),
        })
    }

    /// Analyze around the nominal values of the specs themselves
    pub fn run_at_nominal<S: Simulator + ?Sized>(
        &self,
        specs: &[ParameterSpec],
        simulator: &mut S,
    ) -> Result<OatReport, OatError> {
        self.run(specs, &ParameterSet::nominal(specs), simulator)
    }
}

fn evaluate<S: Simulator + ?Sized>(
    simulator: &mut S,
    point: &ParameterSet,
    label: &str,
    calls: &mut usize,
) -> Result<Outputs, OatError> {
    *calls += 1;
    let outputs = simulator
        .simulate(point)
        .map_err(|source| OatError::Simulation {
            point: label.to_string(),
            source,
        })?;
    if let Some((target, &value)) = outputs.iter().find(|(_, v)| !v.is_finite()) {
        return Err(OatError::NonFiniteOutput {
            point: label.to_string(),
            target: target.clone(),
            value,
        });
    }
    Ok(outputs)
}

fn lookup(outputs: &Outputs, target: &str, parameter: &str, sign: &str, f: f64) -> Result<f64, OatError> {
    outputs
        .get(target)
        .copied()
        .ok_or_else(|| OatError::MissingOutput {
            point: format!("{parameter} {sign}{f}"),
            target: target.to_string(),
        })
}
