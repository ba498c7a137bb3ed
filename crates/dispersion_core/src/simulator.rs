//! The boundary to the external trajectory simulator

use crate::error::SimulationError;
use crate::model::{Outputs, ParameterSet};

/// A deterministic model mapping named parameters to named output metrics.
///
/// Each worker owns its own handle, so implementations may keep internal
/// mutable state; a handle is never shared between threads while in use.
pub trait Simulator: Send {
    fn simulate(&mut self, parameters: &ParameterSet) -> Result<Outputs, SimulationError>;
}

impl<F> Simulator for F
where
    F: FnMut(&ParameterSet) -> Result<Outputs, SimulationError> + Send,
{
    fn simulate(&mut self, parameters: &ParameterSet) -> Result<Outputs, SimulationError> {
        self(parameters)
    }
}

impl Simulator for Box<dyn Simulator> {
    fn simulate(&mut self, parameters: &ParameterSet) -> Result<Outputs, SimulationError> {
        (**self).simulate(parameters)
    }
}
