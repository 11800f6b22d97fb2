//! Job runner - executes one experiment descriptor.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::ExperimentDescriptor;
use crate::error::LogError;
use crate::experiment_log::{render_entry, ExperimentLog};

use super::config::RunConfig;
use super::engine::{EngineError, EngineOutcome, ExperimentEngine};
use super::params::{resolve_channels, EngineParams};
use super::result::JobResult;

/// Runs experiments against an engine and reports them to the shared log.
#[derive(Clone)]
pub struct JobRunner {
    config: Arc<RunConfig>,
    engine: Arc<dyn ExperimentEngine>,
    log: Arc<ExperimentLog>,
}

impl JobRunner {
    /// Creates a new job runner.
    pub fn new(
        config: Arc<RunConfig>,
        engine: Arc<dyn ExperimentEngine>,
        log: Arc<ExperimentLog>,
    ) -> Self {
        Self {
            config,
            engine,
            log,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs one experiment.
    ///
    /// Engine problems of any kind become a `FAILED` result. The only error
    /// returned is a failure to record the result in the shared log.
    pub async fn run(&self, descriptor: ExperimentDescriptor) -> Result<JobResult, LogError> {
        let started_at = Utc::now();
        let name = descriptor.name().to_string();
        let output_dir = self.config.output_dir(&name);
        let execution_log = self.config.execution_log_path(&name);

        info!(
            experiment = %name,
            engine = %self.engine.name(),
            target = %descriptor.target(),
            portion = %descriptor.portion_kind(),
            "Starting experiment"
        );

        let channels = resolve_channels(&descriptor, &self.config.groups).unwrap_or_default();
        let outcome = self.execute(&descriptor, &output_dir, &execution_log).await;
        let result = match outcome {
            Ok(outcome) if outcome.is_success() => {
                JobResult::success(descriptor, started_at, execution_log)
            }
            Ok(EngineOutcome::TimedOut) => JobResult::failure(
                descriptor,
                started_at,
                execution_log,
                format!("engine timed out after {}s", self.config.timeout.as_secs_f64()),
            )
            .with_timeout(),
            Ok(outcome) => JobResult::failure(
                descriptor,
                started_at,
                execution_log,
                format!("engine {}", outcome),
            )
            .with_exit_code(outcome.exit_code()),
            Err(e) => JobResult::failure(descriptor, started_at, execution_log, e.to_string()),
        };

        self.log.append_block(&render_entry(&result, &channels)).await?;

        if result.is_success() {
            info!(
                experiment = %name,
                duration_secs = result.duration().as_secs(),
                "Experiment succeeded"
            );
        } else {
            warn!(
                experiment = %name,
                exit_code = ?result.exit_code,
                timed_out = result.timed_out,
                error = result.error.as_deref().unwrap_or(""),
                "Experiment failed"
            );
        }

        Ok(result)
    }

    async fn execute(
        &self,
        descriptor: &ExperimentDescriptor,
        output_dir: &Path,
        execution_log: &Path,
    ) -> Result<EngineOutcome, EngineError> {
        fs::create_dir_all(output_dir)?;
        let params = EngineParams::for_descriptor(descriptor, &self.config, output_dir)?;
        self.engine
            .execute(&params, execution_log, self.config.timeout)
            .await
    }
}
