//! Bounded pool of concurrently running experiments.
//!
//! Each admitted job runs in its own task and drives one engine process.
//! Admission is gated by a semaphore: a job starts only while fewer than
//! `max_concurrent` jobs are running.
//!
//! # Features
//!
//! - Configurable ceiling on concurrent jobs (`1` is strictly sequential)
//! - Full fault isolation: a failed job never affects its siblings
//! - Fatal handling of experiment log failures
//! - Live in-flight gauge and batch statistics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::ExperimentDescriptor;
use crate::error::LogError;
use crate::experiment_log::ExperimentLog;
use crate::runner::{ExperimentEngine, JobResult, JobRunner, RunConfig};

/// Errors that can abort a batch.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The concurrency ceiling must allow at least one job.
    #[error("max_concurrent must be at least 1")]
    InvalidConcurrency,

    /// The experiment log could not be written.
    #[error("Experiment log failure: {0}")]
    Log(#[from] LogError),

    /// A worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    WorkerFailed(String),

    /// The admission semaphore was closed.
    #[error("Scheduler was closed")]
    Closed,
}

/// Statistics about a finished or running batch.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Jobs that finished successfully.
    pub successful: u64,
    /// Jobs that finished with a failure.
    pub failed: u64,
    /// Jobs currently running.
    pub in_flight: usize,
    /// Highest number of simultaneously running jobs observed.
    pub peak_in_flight: usize,
    /// Sum of all job durations.
    pub total_job_duration: Duration,
}

impl BatchStats {
    /// Returns the total number of finished jobs.
    pub fn total_finished(&self) -> u64 {
        self.successful + self.failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_finished();
        if total == 0 {
            return 0.0;
        }
        (self.successful as f64 / total as f64) * 100.0
    }
}

/// State shared by every job of one orchestrator invocation.
#[derive(Debug)]
pub struct RunState {
    log: Arc<ExperimentLog>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    successful: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl RunState {
    pub fn new(log: Arc<ExperimentLog>) -> Self {
        Self {
            log,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
        }
    }

    pub fn log(&self) -> &Arc<ExperimentLog> {
        &self.log
    }

    /// Number of jobs running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> SlotGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        SlotGuard {
            state: Arc::clone(self),
        }
    }

    fn record(&self, result: &JobResult) {
        if result.is_success() {
            self.successful.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.total_duration_ms
            .fetch_add(result.duration().as_millis() as u64, Ordering::SeqCst);
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            successful: self.successful.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            total_job_duration: Duration::from_millis(self.total_duration_ms.load(Ordering::SeqCst)),
        }
    }
}

/// Marks one running job; releases its in-flight slot on drop.
struct SlotGuard {
    state: Arc<RunState>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dispatches a catalog onto a bounded number of concurrent jobs.
pub struct Scheduler {
    runner: JobRunner,
    state: Arc<RunState>,
}

impl Scheduler {
    /// Creates a scheduler running jobs with `config` against `engine`.
    pub fn new(
        config: RunConfig,
        engine: Arc<dyn ExperimentEngine>,
        log: Arc<ExperimentLog>,
    ) -> Self {
        let state = Arc::new(RunState::new(Arc::clone(&log)));
        Self {
            runner: JobRunner::new(Arc::new(config), engine, log),
            state,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Returns current batch statistics.
    pub fn stats(&self) -> BatchStats {
        self.state.stats()
    }

    /// Runs every descriptor and returns results in completion order.
    ///
    /// Returns only once every job has produced a result. Job failures are
    /// part of the results; only a log failure or a crashed worker aborts
    /// the batch.
    pub async fn run_all(
        &self,
        catalog: Vec<ExperimentDescriptor>,
        max_concurrent: usize,
    ) -> Result<Vec<JobResult>, SchedulerError> {
        if max_concurrent == 0 {
            return Err(SchedulerError::InvalidConcurrency);
        }

        let batch_id = Uuid::new_v4();
        let total = catalog.len();
        let started = Instant::now();
        self.state
            .log
            .append(&format!(
                "# batch {} started {} experiments={} max_concurrent={}",
                batch_id,
                Utc::now().to_rfc3339(),
                total,
                max_concurrent
            ))
            .await?;
        info!(
            batch = %batch_id,
            experiments = total,
            max_concurrent = max_concurrent,
            "Batch started"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut tasks: JoinSet<Result<JobResult, LogError>> = JoinSet::new();
        let mut results = Vec::with_capacity(total);

        for descriptor in catalog {
            let permit = loop {
                // Finished jobs first, so a fatal result is seen before the next admission.
                let admission = tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => Admission::Finished(joined),
                    permit = Arc::clone(&semaphore).acquire_owned() => Admission::Slot(permit),
                };
                match admission {
                    Admission::Slot(permit) => break permit.map_err(|_| SchedulerError::Closed)?,
                    Admission::Finished(joined) => match self.collect(joined) {
                        Ok(result) => results.push(result),
                        Err(e) => return Err(abort(&mut tasks, e).await),
                    },
                }
            };

            debug!(experiment = %descriptor.name(), "Admitting experiment");
            self.spawn(&mut tasks, descriptor, permit);
        }

        while let Some(joined) = tasks.join_next().await {
            match self.collect(joined) {
                Ok(result) => results.push(result),
                Err(e) => return Err(abort(&mut tasks, e).await),
            }
        }

        let stats = self.stats();
        self.state
            .log
            .append(&format!(
                "# batch {} finished {} successful={} failed={}",
                batch_id,
                Utc::now().to_rfc3339(),
                stats.successful,
                stats.failed
            ))
            .await?;
        info!(
            batch = %batch_id,
            successful = stats.successful,
            failed = stats.failed,
            peak_in_flight = stats.peak_in_flight,
            elapsed_secs = started.elapsed().as_secs(),
            "Batch finished"
        );

        Ok(results)
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<Result<JobResult, LogError>>,
        descriptor: ExperimentDescriptor,
        permit: OwnedSemaphorePermit,
    ) {
        let runner = self.runner.clone();
        let state = Arc::clone(&self.state);
        tasks.spawn(async move {
            let _permit = permit;
            let _slot = state.enter();
            runner.run(descriptor).await
        });
    }

    fn collect(
        &self,
        joined: Result<Result<JobResult, LogError>, JoinError>,
    ) -> Result<JobResult, SchedulerError> {
        match joined {
            Ok(Ok(result)) => {
                self.state.record(&result);
                Ok(result)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Experiment log failure, aborting batch");
                Err(SchedulerError::Log(e))
            }
            Err(e) => {
                error!(error = %e, "Worker task failed, aborting batch");
                Err(SchedulerError::WorkerFailed(e.to_string()))
            }
        }
    }
}

/// Cancels every job still running and waits until their engines are gone.
async fn abort(
    tasks: &mut JoinSet<Result<JobResult, LogError>>,
    error: SchedulerError,
) -> SchedulerError {
    if !tasks.is_empty() {
        warn!(remaining = tasks.len(), "Cancelling running experiments");
    }
    tasks.shutdown().await;
    error
}

enum Admission {
    Slot(Result<OwnedSemaphorePermit, tokio::sync::AcquireError>),
    Finished(Result<Result<JobResult, LogError>, JoinError>),
}

/// Runs `catalog` with a fresh scheduler.
pub async fn run_all(
    catalog: Vec<ExperimentDescriptor>,
    max_concurrent: usize,
    config: RunConfig,
    engine: Arc<dyn ExperimentEngine>,
    log: Arc<ExperimentLog>,
) -> Result<Vec<JobResult>, SchedulerError> {
    Scheduler::new(config, engine, log)
        .run_all(catalog, max_concurrent)
        .await
}
