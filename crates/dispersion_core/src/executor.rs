//! Single-trial execution with failure isolation
//!
//! A trial never takes the ensemble down with it: simulator errors, panics,
//! non-finite metrics and timeouts all become [`TrialResult::Failure`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::SimulationError;
use crate::model::{FailureReason, Outputs, ParameterSet, TrialResult};
use crate::simulator::Simulator;

/// Runs one parameter set through a simulator handle.
///
/// The handle is passed by value and handed back when it is still usable.
/// After a panic or a timeout the handle is gone and the caller must build a
/// fresh one.
#[derive(Debug, Clone, Default)]
pub struct TrialExecutor {
    timeout: Option<Duration>,
}

impl TrialExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn execute<S>(
        &self,
        index: usize,
        parameters: &ParameterSet,
        simulator: S,
    ) -> (TrialResult, Option<S>)
    where
        S: Simulator + 'static,
    {
        let (result, simulator) = match self.timeout {
            None => run_inline(parameters, simulator),
            Some(limit) => run_with_timeout(index, parameters, simulator, limit),
        };

        if let TrialResult::Failure { reason, message } = &result {
            tracing::debug!(trial = index, %reason, detail = %message, "trial failed");
        }
        (result, simulator)
    }
}

fn run_inline<S: Simulator>(parameters: &ParameterSet, mut simulator: S) -> (TrialResult, Option<S>) {
    match panic::catch_unwind(AssertUnwindSafe(|| simulator.simulate(parameters))) {
        Ok(outcome) => (classify(outcome), Some(simulator)),
        Err(payload) => (
            TrialResult::failure(FailureReason::Panicked, panic_message(payload.as_ref())),
            None,
        ),
    }
}

type Delivery<S> = Result<(Result<Outputs, SimulationError>, S), String>;

fn run_with_timeout<S>(
    index: usize,
    parameters: &ParameterSet,
    simulator: S,
    limit: Duration,
) -> (TrialResult, Option<S>)
where
    S: Simulator + 'static,
{
    let (tx, rx) = mpsc::channel::<Delivery<S>>();
    let parameters = parameters.clone();

    // The trial thread is detached; on timeout it is abandoned together with
    // its simulator handle.
    let spawned = thread::Builder::new()
        .name(format!("trial-{index}"))
        .spawn(move || {
            let mut simulator = simulator;
            let delivery =
                match panic::catch_unwind(AssertUnwindSafe(|| simulator.simulate(&parameters))) {
                    Ok(outcome) => Ok((outcome, simulator)),
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
            let _ = tx.send(delivery);
        });

    if let Err(e) = spawned {
        return (
            TrialResult::failure(
                FailureReason::SimulatorError,
                format!("could not start trial thread: {e}"),
            ),
            None,
        );
    }

    match rx.recv_timeout(limit) {
        Ok(Ok((outcome, simulator))) => (classify(outcome), Some(simulator)),
        Ok(Err(message)) => (TrialResult::failure(FailureReason::Panicked, message), None),
        Err(RecvTimeoutError::Timeout) => (
            TrialResult::failure(
                FailureReason::Timeout,
                format!("no result within {:.3}s", limit.as_secs_f64()),
            ),
            None,
        ),
        Err(RecvTimeoutError::Disconnected) => (
            TrialResult::failure(FailureReason::Panicked, "trial thread exited without a result"),
            None,
        ),
    }
}

/// Map a raw simulator outcome onto a trial result
fn classify(outcome: Result<Outputs, SimulationError>) -> TrialResult {
    match outcome {
        Err(e) => TrialResult::failure(FailureReason::SimulatorError, e.message()),
        Ok(outputs) => {
            if let Some((name, value)) = outputs.iter().find(|(_, v)| !v.is_finite()) {
                return TrialResult::failure(
                    FailureReason::NonFiniteOutput,
                    format!("metric `{name}` = {value}"),
                );
            }
            TrialResult::Success { outputs }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("simulator panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("simulator panicked: {s}")
    } else {
        "simulator panicked".to_string()
    }
}
