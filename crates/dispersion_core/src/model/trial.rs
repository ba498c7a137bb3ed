//! Per-trial outcomes

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Named scalar metrics reported by one simulator call
pub type Outputs = BTreeMap<String, f64>;

/// Why a trial produced no usable outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The simulator returned an error
    SimulatorError,
    /// The simulator returned NaN or an infinite metric
    NonFiniteOutput,
    /// The simulator panicked
    Panicked,
    /// The trial exceeded the per-trial timeout
    Timeout,
    /// The ensemble deadline passed or the run was cancelled before dispatch
    NotDispatched,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureReason::SimulatorError => "simulator error",
            FailureReason::NonFiniteOutput => "non-finite output",
            FailureReason::Panicked => "panic",
            FailureReason::Timeout => "timeout",
            FailureReason::NotDispatched => "not dispatched",
        };
        f.write_str(label)
    }
}

/// Outcome of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialResult {
    Success {
        outputs: Outputs,
    },
    Failure {
        reason: FailureReason,
        message: String,
    },
}

impl TrialResult {
    pub fn failure(reason: FailureReason, message: impl Into<String>) -> Self {
        TrialResult::Failure {
            reason,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TrialResult::Success { .. })
    }

    pub fn outputs(&self) -> Option<&Outputs> {
        match self {
            TrialResult::Success { outputs } => Some(outputs),
            TrialResult::Failure { .. } => None,
        }
    }

    pub fn output(&self, name: &str) -> Option<f64> {
        self.outputs().and_then(|o| o.get(name).copied())
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            TrialResult::Success { .. } => None,
            TrialResult::Failure { reason, .. } => Some(*reason),
        }
    }
}

/// Count failures by reason
pub fn failure_breakdown<'a>(
    results: impl IntoIterator<Item = &'a TrialResult>,
) -> BTreeMap<FailureReason, usize> {
    results
        .into_iter()
        .filter_map(TrialResult::failure_reason)
        .fold(BTreeMap::new(), |mut acc, reason| {
            *acc.entry(reason).or_insert(0) += 1;
            acc
        })
}
