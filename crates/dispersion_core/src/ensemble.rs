//! Parallel ensemble execution
//!
//! All parameter sets are sampled before any trial runs. A fixed pool of
//! scoped workers then claims trial indices from a shared cursor, each worker
//! owning its own simulator handle. Results flow back over a channel and are
//! re-sequenced, so sinks always see trials in index order regardless of
//! completion order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use tracing::{info, warn};

use crate::config::EnsembleConfig;
use crate::design::{DesignMatrix, DesignMatrixBuilder};
use crate::error::{DesignError, EnsembleError};
use crate::executor::TrialExecutor;
use crate::model::{
    EnsembleSummary, EnsembleWarning, FailureReason, Outputs, ParameterSet, ParameterSpec,
    TrialResult, failure_breakdown,
};
use crate::sampling::ParameterSampler;
use crate::simulator::Simulator;
use crate::stats;

/// Completions required before an abort threshold is evaluated
const ABORT_MIN_COMPLETIONS: usize = 20;

/// Progress tracking for ensemble runs.
///
/// Clones share the same counters, so a UI thread can poll a clone while the
/// run is in flight, and cancel it.
#[derive(Debug, Clone)]
pub struct EnsembleProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl EnsembleProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create from existing atomics
    pub fn from_atomics(
        completed: Arc<AtomicUsize>,
        total: Arc<AtomicUsize>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            completed,
            total,
            cancelled,
        }
    }

    /// Trials finished so far, successful or not
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed share in `[0, 1]`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.completed() as f64 / total as f64,
        }
    }

    pub fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Start a fresh run: zero the counters and clear any earlier cancel
    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Stop dispatching new trials; trials in flight still finish
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for EnsembleProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A contiguous, index-ordered slice of finished trials
#[derive(Debug)]
pub struct TrialBatch<'a> {
    /// Index of the first trial in the batch
    pub start: usize,
    pub parameter_sets: &'a [ParameterSet],
    pub results: Vec<TrialResult>,
}

impl TrialBatch<'_> {
    /// `(trial index, parameters, result)` triples
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ParameterSet, &TrialResult)> {
        self.parameter_sets
            .iter()
            .zip(&self.results)
            .enumerate()
            .map(|(offset, (set, result))| (self.start + offset, set, result))
    }
}

/// Bookkeeping of a run whose results went to a sink
#[derive(Debug, Clone)]
pub struct EnsembleStatus {
    pub seed: u64,
    pub parameter_sets: Vec<ParameterSet>,
    /// Trials handed to a worker
    pub dispatched: usize,
    pub num_successes: usize,
    pub failures_by_reason: BTreeMap<FailureReason, usize>,
    pub warnings: Vec<EnsembleWarning>,
    pub started_at: Timestamp,
    pub elapsed: Duration,
}

/// Parameter sets and results of a completed ensemble, index-aligned
#[derive(Debug, Clone)]
pub struct EnsembleRun {
    pub seed: u64,
    pub parameter_sets: Vec<ParameterSet>,
    pub results: Vec<TrialResult>,
    pub dispatched: usize,
    pub warnings: Vec<EnsembleWarning>,
    pub started_at: Timestamp,
    pub elapsed: Duration,
}

impl EnsembleRun {
    pub fn num_trials(&self) -> usize {
        self.results.len()
    }

    pub fn num_successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures_by_reason(&self) -> BTreeMap<FailureReason, usize> {
        failure_breakdown(&self.results)
    }

    /// Share of dispatched trials that failed in the simulator
    pub fn failure_rate(&self) -> f64 {
        stats::simulated_failure_rate(&self.failures_by_reason(), self.dispatched)
    }

    /// Successful trials as `(trial index, parameters, outputs)`
    pub fn successes(&self) -> impl Iterator<Item = (usize, &ParameterSet, &Outputs)> {
        self.parameter_sets
            .iter()
            .zip(&self.results)
            .enumerate()
            .filter_map(|(i, (set, result))| result.outputs().map(|o| (i, set, o)))
    }

    pub fn summarize(&self, percentiles: &[f64]) -> Result<EnsembleSummary, EnsembleError> {
        stats::summarize(&self.results, percentiles)
    }

    /// Design matrix of the successful trials, targets in sorted name order
    pub fn design_matrix(&self) -> Result<DesignMatrix, DesignError> {
        DesignMatrixBuilder::from_run(self)?.build()
    }
}

/// Running totals over received results
#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    successes: usize,
    failures: BTreeMap<FailureReason, usize>,
}

impl Tally {
    fn record(&mut self, result: &TrialResult) {
        match result.failure_reason() {
            None => self.successes += 1,
            Some(reason) => *self.failures.entry(reason).or_insert(0) += 1,
        }
        if result.failure_reason() != Some(FailureReason::NotDispatched) {
            self.completed += 1;
        }
    }

    fn failure_rate(&self) -> f64 {
        stats::simulated_failure_rate(&self.failures, self.completed)
    }
}

/// Re-sequences out-of-order results into contiguous index-ordered batches
#[derive(Debug)]
struct ReorderBuffer {
    batch_size: usize,
    next: usize,
    ready_start: usize,
    pending: BTreeMap<usize, TrialResult>,
    ready: Vec<TrialResult>,
}

impl ReorderBuffer {
    fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            next: 0,
            ready_start: 0,
            pending: BTreeMap::new(),
            ready: Vec::new(),
        }
    }

    fn insert(&mut self, index: usize, result: TrialResult) {
        self.pending.insert(index, result);
        while let Some(result) = self.pending.remove(&self.next) {
            self.ready.push(result);
            self.next += 1;
        }
    }

    /// A full batch, if one is ready
    fn take_batch(&mut self) -> Option<(usize, Vec<TrialResult>)> {
        if self.ready.len() < self.batch_size {
            return None;
        }
        let rest = self.ready.split_off(self.batch_size);
        Some(self.emit(rest))
    }

    /// Whatever is ready, even a partial batch
    fn flush(&mut self) -> Option<(usize, Vec<TrialResult>)> {
        if self.ready.is_empty() {
            return None;
        }
        Some(self.emit(Vec::new()))
    }

    fn emit(&mut self, rest: Vec<TrialResult>) -> (usize, Vec<TrialResult>) {
        let batch = std::mem::replace(&mut self.ready, rest);
        let start = self.ready_start;
        self.ready_start += batch.len();
        (start, batch)
    }
}

/// Runs ensembles of trials against a simulator
#[derive(Debug, Clone)]
pub struct EnsembleRunner {
    config: EnsembleConfig,
    progress: Option<EnsembleProgress>,
}

impl EnsembleRunner {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Report progress through, and accept cancellation from, `progress`
    #[must_use]
    pub fn with_progress(mut self, progress: EnsembleProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Run the ensemble and collect every result in index order.
    ///
    /// `factory` builds one simulator handle per worker, and a replacement
    /// whenever a handle is lost to a panic or a timeout.
    pub fn run<S, F>(&self, specs: &[ParameterSpec], factory: F) -> Result<EnsembleRun, EnsembleError>
    where
        S: Simulator + 'static,
        F: Fn() -> S + Sync,
    {
        let mut results = Vec::with_capacity(self.config.trials);
        let status = self.run_with_sink(specs, factory, |batch| results.extend(batch.results))?;

        Ok(EnsembleRun {
            seed: status.seed,
            parameter_sets: status.parameter_sets,
            results,
            dispatched: status.dispatched,
            warnings: status.warnings,
            started_at: status.started_at,
            elapsed: status.elapsed,
        })
    }

    /// Run the ensemble, handing index-ordered batches to `sink` as they complete.
    pub fn run_with_sink<S, F, K>(
        &self,
        specs: &[ParameterSpec],
        factory: F,
        mut sink: K,
    ) -> Result<EnsembleStatus, EnsembleError>
    where
        S: Simulator + 'static,
        F: Fn() -> S + Sync,
        K: FnMut(TrialBatch<'_>),
    {
        self.config.validate()?;

        let started_at = Timestamp::now();
        let clock = Instant::now();

        let parameter_sets = ParameterSampler::new(self.config.seed)
            .with_max_retries(self.config.max_sampling_retries)
            .sample(specs, self.config.trials)?;

        let total = parameter_sets.len();
        let workers = self.config.worker_count(total);
        let executor = TrialExecutor::new(self.config.trial_timeout());
        let deadline = self.config.deadline().and_then(|d| clock.checked_add(d));
        let progress = self.progress.clone().unwrap_or_default();
        progress.reset(total);

        info!(
            trials = total,
            workers,
            seed = self.config.seed,
            "starting ensemble"
        );

        let cursor = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let mut tally = Tally::default();
        let mut reorder = ReorderBuffer::new(self.config.batch_size);

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, TrialResult)>();

            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                let abort = &abort;
                let progress = &progress;
                let executor = &executor;
                let factory = &factory;
                let sets = &parameter_sets;

                scope.spawn(move || {
                    let mut simulator: Option<S> = None;
                    loop {
                        if progress.is_cancelled()
                            || abort.load(Ordering::Relaxed)
                            || deadline.is_some_and(|d| Instant::now() >= d)
                        {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= sets.len() {
                            break;
                        }
                        let handle = simulator.take().unwrap_or_else(factory);
                        let (result, handle) = executor.execute(index, &sets[index], handle);
                        simulator = handle;
                        if tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (index, result) in rx {
                progress.increment();
                tally.record(&result);
                if let Some(threshold) = self.config.abort_failure_rate
                    && tally.completed >= ABORT_MIN_COMPLETIONS.min(total)
                    && tally.failure_rate() > threshold
                {
                    abort.store(true, Ordering::Relaxed);
                }
                reorder.insert(index, result);
                while let Some((start, results)) = reorder.take_batch() {
                    deliver(&mut sink, &parameter_sets, start, results);
                }
            }
        });

        let dispatched = cursor.load(Ordering::Relaxed).min(total);
        let aborted = abort.load(Ordering::Relaxed);
        let mut warnings = Vec::new();

        if dispatched < total {
            let cancelled = progress.is_cancelled();
            let label = if cancelled {
                "run cancelled"
            } else if aborted {
                "failure rate exceeded"
            } else {
                "deadline reached"
            };
            for index in dispatched..total {
                let result = TrialResult::failure(
                    FailureReason::NotDispatched,
                    format!("{label} before dispatch"),
                );
                tally.record(&result);
                reorder.insert(index, result);
            }
            if !aborted {
                warn!(dispatched, total, "{label}; remaining trials not dispatched");
                warnings.push(if cancelled {
                    EnsembleWarning::Cancelled { dispatched, total }
                } else {
                    EnsembleWarning::DeadlineReached { dispatched, total }
                });
            }
        }
        while let Some((start, results)) = reorder.take_batch() {
            deliver(&mut sink, &parameter_sets, start, results);
        }
        if let Some((start, results)) = reorder.flush() {
            deliver(&mut sink, &parameter_sets, start, results);
        }

        let rate = tally.failure_rate();
        let failures: usize = tally.failures.values().sum();

        if let Some(threshold) = self.config.abort_failure_rate
            && (aborted || rate > threshold)
        {
            warn!(rate, threshold, "ensemble aborted on failure rate");
            return Err(EnsembleError::FailureRateExceeded {
                rate,
                threshold,
                failures: tally.failures,
            });
        }

        if rate > self.config.failure_rate_warning {
            warn!(
                rate,
                threshold = self.config.failure_rate_warning,
                "high trial failure rate"
            );
            warnings.push(EnsembleWarning::HighFailureRate {
                rate,
                threshold: self.config.failure_rate_warning,
                failures_by_reason: tally.failures.clone(),
            });
        }

        let elapsed = clock.elapsed();
        info!(
            successes = tally.successes,
            failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "ensemble complete"
        );

        Ok(EnsembleStatus {
            seed: self.config.seed,
            parameter_sets,
            dispatched,
            num_successes: tally.successes,
            failures_by_reason: tally.failures,
            warnings,
            started_at,
            elapsed,
        })
    }
}

fn deliver<K>(sink: &mut K, sets: &[ParameterSet], start: usize, results: Vec<TrialResult>)
where
    K: FnMut(TrialBatch<'_>),
{
    let end = start + results.len();
    sink(TrialBatch {
        start,
        parameter_sets: &sets[start..end],
        results,
    });
}
