//! Shared configuration for experiment runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{is_filesystem_safe, GroupTable};
use crate::error::ConfigError;

/// Default per-experiment timeout (4 hours).
pub const DEFAULT_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// Configuration shared by every job of a batch.
///
/// Built once at startup and handed to the scheduler; workers never look up
/// settings anywhere else.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory holding one subdirectory per experiment.
    pub output_root: PathBuf,
    /// Prepared data archive passed to the engine as `data_path`.
    pub data_path: PathBuf,
    /// Hard wall-clock limit per experiment.
    pub timeout: Duration,
    /// Experiment tracking group forwarded as `wandb_group`.
    pub group_tag: Option<String>,
    /// Leading timesteps the engine should drop.
    pub skip_first_n_timesteps: Option<u32>,
    /// Channel groups used to resolve group descriptors.
    pub groups: GroupTable,
    /// File name of the shared log inside `output_root`.
    pub log_file_name: String,
    /// File name of each experiment's execution log.
    pub execution_log_name: String,
    /// File name of the engine's results artifact.
    pub results_file_name: String,
    /// File name of the generated summary inside `output_root`.
    pub summary_file_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./experiments"),
            data_path: PathBuf::from("./data/forming_dataset.npz"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            group_tag: None,
            skip_first_n_timesteps: None,
            groups: GroupTable::default(),
            log_file_name: "experiment_log.txt".to_string(),
            execution_log_name: "execution.log".to_string(),
            results_file_name: "results.txt".to_string(),
            summary_file_name: "summary.txt".to_string(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration writing under `output_root`.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    /// Sets the data archive path.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Sets the per-experiment timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the tracking group; blank tags are treated as absent.
    pub fn with_group_tag(mut self, tag: Option<String>) -> Self {
        self.group_tag = tag
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    /// Sets the number of skipped timesteps; zero is treated as absent.
    pub fn with_skip_timesteps(mut self, skip: Option<u32>) -> Self {
        self.skip_first_n_timesteps = skip.filter(|&n| n > 0);
        self
    }

    /// Replaces the group table.
    pub fn with_groups(mut self, groups: GroupTable) -> Self {
        self.groups = groups;
        self
    }

    /// Sets the results artifact file name.
    pub fn with_results_file_name(mut self, name: impl Into<String>) -> Self {
        self.results_file_name = name.into();
        self
    }

    /// Output directory of an experiment.
    pub fn output_dir(&self, name: &str) -> PathBuf {
        self.output_root.join(name)
    }

    /// Execution log of an experiment.
    pub fn execution_log_path(&self, name: &str) -> PathBuf {
        self.output_dir(name).join(&self.execution_log_name)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_root.join(&self.log_file_name)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_root.join(&self.summary_file_name)
    }

    /// Machine-readable record of every job result of the last batch.
    pub fn batch_results_path(&self) -> PathBuf {
        self.output_root.join("batch_results.json")
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.data_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "data_path".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "output_root".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        for (key, name) in [
            ("log_file_name", &self.log_file_name),
            ("execution_log_name", &self.execution_log_name),
            ("results_file_name", &self.results_file_name),
            ("summary_file_name", &self.summary_file_name),
        ] {
            if !is_filesystem_safe(name) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{}' is not a plain file name", name),
                });
            }
        }

        self.groups
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))
    }
}

/// Interactive or flag-provided optional settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalSettings {
    pub group_tag: Option<String>,
    pub skip_first_n_timesteps: Option<u32>,
}

impl OptionalSettings {
    /// Applies the settings to a run configuration.
    pub fn apply(self, config: RunConfig) -> RunConfig {
        config
            .with_group_tag(self.group_tag)
            .with_skip_timesteps(self.skip_first_n_timesteps)
    }
}
