//! Job results.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ExperimentDescriptor;

/// Final status of an experiment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// The engine exited with status zero.
    Success,
    /// Non-zero exit, signal, timeout, or the engine could not be started.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Outcome of running one experiment descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// The experiment that ran.
    pub descriptor: ExperimentDescriptor,
    /// Final status.
    pub status: JobStatus,
    /// When the engine was started.
    pub started_at: DateTime<Utc>,
    /// When the engine finished or was killed.
    pub ended_at: DateTime<Utc>,
    /// Per-experiment execution log holding the engine's combined output.
    pub log_path: PathBuf,
    /// Engine exit code, absent on timeout, signal, or spawn failure.
    pub exit_code: Option<i32>,
    /// Whether the engine was killed for exceeding its timeout.
    pub timed_out: bool,
    /// Reason for a failure, if any.
    pub error: Option<String>,
}

impl JobResult {
    /// Creates a successful result.
    pub fn success(
        descriptor: ExperimentDescriptor,
        started_at: DateTime<Utc>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            descriptor,
            status: JobStatus::Success,
            started_at,
            ended_at: Utc::now(),
            log_path,
            exit_code: Some(0),
            timed_out: false,
            error: None,
        }
    }

    /// Creates a failed result.
    pub fn failure(
        descriptor: ExperimentDescriptor,
        started_at: DateTime<Utc>,
        log_path: PathBuf,
        error: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            status: JobStatus::Failed,
            started_at,
            ended_at: Utc::now(),
            log_path,
            exit_code: None,
            timed_out: false,
            error: Some(error.into()),
        }
    }

    /// Sets the exit code.
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Marks the result as timed out.
    pub fn with_timeout(mut self) -> Self {
        self.timed_out = true;
        self.exit_code = None;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Wall-clock duration of the job.
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }
}
