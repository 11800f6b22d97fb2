//! External experiment engine boundary.
//!
//! The engine is whatever actually trains and evaluates a model; the
//! orchestrator only starts it with a parameter set, bounds its runtime,
//! and reads its exit status.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::params::{EngineParams, ParamValue};

/// Placeholder in engine arguments replaced by the experiment's output directory.
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// How an engine invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The process exited with this status code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signalled,
    /// The process exceeded its timeout and was killed.
    TimedOut,
}

impl EngineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EngineOutcome::Exited(0))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EngineOutcome::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineOutcome::Exited(code) => write!(f, "exited with code {}", code),
            EngineOutcome::Signalled => write!(f, "terminated by signal"),
            EngineOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Error type for engine invocations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to start engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare execution log {path}: {source}")]
    ExecutionLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for engine: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Unknown channel group '{0}'")]
    UnknownGroup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for experiment engines.
#[async_trait]
pub trait ExperimentEngine: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Runs one experiment to completion or timeout.
    ///
    /// Combined output goes to `execution_log`. Returns an error only when
    /// the engine could not be run at all.
    async fn execute(
        &self,
        params: &EngineParams,
        execution_log: &Path,
        timeout: Duration,
    ) -> Result<EngineOutcome, EngineError>;
}

/// How parameters are rendered on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamStyle {
    /// `-p key value` for scalars, `-y "key: [1, 2]"` for lists.
    #[default]
    Papermill,
    /// `--key value`, lists comma-separated.
    LongFlags,
}

/// Engine that runs an external command per experiment.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    style: ParamStyle,
}

impl CommandEngine {
    /// Creates an engine running `program` with no leading arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            style: ParamStyle::default(),
        }
    }

    /// Runs `notebook` through papermill, storing the executed copy in the
    /// experiment's output directory.
    pub fn papermill(notebook: impl Into<String>) -> Self {
        Self::new("papermill").with_args(vec![
            notebook.into(),
            format!("{}/executed.ipynb", OUTPUT_DIR_PLACEHOLDER),
        ])
    }

    /// Sets the leading arguments, placed before the parameters.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the parameter rendering style.
    pub fn with_style(mut self, style: ParamStyle) -> Self {
        self.style = style;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for `params`.
    pub fn command_args(&self, params: &EngineParams) -> Vec<String> {
        let output_dir = params.plot_path.display().to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(OUTPUT_DIR_PLACEHOLDER, &output_dir))
            .collect();

        for (key, value) in params.entries() {
            match (self.style, value) {
                (ParamStyle::Papermill, ParamValue::Text(text)) => {
                    args.extend(["-p".to_string(), key.to_string(), text]);
                }
                (ParamStyle::Papermill, ParamValue::Int(n)) => {
                    args.extend(["-p".to_string(), key.to_string(), n.to_string()]);
                }
                (ParamStyle::Papermill, ParamValue::IntList(list)) => {
                    let items: Vec<String> = list.iter().map(|c| c.to_string()).collect();
                    args.extend(["-y".to_string(), format!("{}: [{}]", key, items.join(", "))]);
                }
                (ParamStyle::LongFlags, ParamValue::Text(text)) => {
                    args.extend([format!("--{}", key), text]);
                }
                (ParamStyle::LongFlags, ParamValue::Int(n)) => {
                    args.extend([format!("--{}", key), n.to_string()]);
                }
                (ParamStyle::LongFlags, ParamValue::IntList(list)) => {
                    let items: Vec<String> = list.iter().map(|c| c.to_string()).collect();
                    args.extend([format!("--{}", key), items.join(",")]);
                }
            }
        }

        args
    }
}

#[async_trait]
impl ExperimentEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    async fn execute(
        &self,
        params: &EngineParams,
        execution_log: &Path,
        timeout: Duration,
    ) -> Result<EngineOutcome, EngineError> {
        let args = self.command_args(params);

        let log_error = |source: std::io::Error| EngineError::ExecutionLog {
            path: execution_log.to_path_buf(),
            source,
        };
        let mut stdout = fs::File::create(execution_log).map_err(log_error)?;
        writeln!(stdout, "$ {} {}", self.program, args.join(" ")).map_err(log_error)?;
        let stderr = stdout.try_clone().map_err(log_error)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(program = %self.program, args = ?args, "Spawning engine");
        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::new(child.id());

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                group.release();
                Ok(status
                    .code()
                    .map(EngineOutcome::Exited)
                    .unwrap_or(EngineOutcome::Signalled))
            }
            Ok(Err(e)) => Err(EngineError::Wait(e)),
            Err(_) => {
                warn!(
                    plot_path = %params.plot_path.display(),
                    timeout_secs = timeout.as_secs_f64(),
                    "Engine exceeded timeout, killing its process group"
                );
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill engine process");
                }
                Ok(EngineOutcome::TimedOut)
            }
        }
    }
}

/// Process group of a running engine.
///
/// The engine leads its own group, so everything it starts (notebook
/// kernels, worker pools) is killed with it. The group is killed on drop
/// unless the leader was reaped normally.
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { leader }
    }

    /// The leader was reaped and its pid may be reused, so the group is left alone.
    fn release(&mut self) {
        self.leader = None;
    }

    fn kill(&mut self) {
        if let Some(leader) = self.leader.take() {
            kill_process_group(leader);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(leader: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(leader as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = leader, error = %e, "Failed to kill engine process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_leader: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Target;

    fn params(dir: &Path) -> EngineParams {
        EngineParams {
            data_path: PathBuf::from("data.npz"),
            plot_path: dir.to_path_buf(),
            classification_target: Target::Ironing,
            channels: vec![1, 2, 3],
            wandb_group: None,
            skip_first_n_timesteps: Some(5),
        }
    }

    #[test]
    fn test_papermill_args() {
        let engine = CommandEngine::papermill("analysis.ipynb");
        let args = engine.command_args(&params(Path::new("out/direct_ironing")));

        assert_eq!(engine.program(), "papermill");
        assert_eq!(
            args,
            vec![
                "analysis.ipynb",
                "out/direct_ironing/executed.ipynb",
                "-p",
                "data_path",
                "data.npz",
                "-p",
                "plot_path",
                "out/direct_ironing",
                "-p",
                "classification_target",
                "Ironing",
                "-y",
                "channels: [1, 2, 3]",
                "-p",
                "skip_first_n_timesteps",
                "5",
            ]
        );
    }

    #[test]
    fn test_long_flag_args() {
        let engine = CommandEngine::new("train").with_style(ParamStyle::LongFlags);
        let args = engine.command_args(&params(Path::new("out")));

        assert!(args.windows(2).any(|w| w == ["--channels", "1,2,3"]));
        assert!(args.windows(2).any(|w| w == ["--classification_target", "Ironing"]));
        assert!(!args.iter().any(|a| a == "--wandb_group"));
    }

    #[test]
    fn test_outcome_classification() {
        assert!(EngineOutcome::Exited(0).is_success());
        assert!(!EngineOutcome::Exited(2).is_success());
        assert!(!EngineOutcome::TimedOut.is_success());
        assert!(!EngineOutcome::Signalled.is_success());
        assert_eq!(EngineOutcome::Exited(2).exit_code(), Some(2));
        assert_eq!(EngineOutcome::TimedOut.exit_code(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output_and_status() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = CommandEngine::new("sh").with_args(vec![
            "-c".to_string(),
            "echo out; echo err 1>&2; exit 3".to_string(),
            "engine".to_string(),
        ]);
        let log = temp.path().join("execution.log");

        let outcome = engine
            .execute(&params(temp.path()), &log, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome, EngineOutcome::Exited(3));
        let content = fs::read_to_string(&log).unwrap();
        assert!(content.starts_with("$ sh -c"));
        assert!(content.contains("out\n"));
        assert!(content.contains("err\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_times_out() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = CommandEngine::new("sh").with_args(vec![
            "-c".to_string(),
            "exec sleep 30".to_string(),
            "engine".to_string(),
        ]);
        let log = temp.path().join("execution.log");

        let started = std::time::Instant::now();
        let outcome = engine
            .execute(&params(temp.path()), &log, Duration::from_millis(300))
            .await
            .unwrap();

        assert_eq!(outcome, EngineOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let temp = tempfile::TempDir::new().unwrap();
        let marker = temp.path().join("survived");
        let engine = CommandEngine::new("sh").with_args(vec![
            "-c".to_string(),
            format!("(sleep 2; touch '{}') & wait", marker.display()),
            "engine".to_string(),
        ]);
        let log = temp.path().join("execution.log");

        let outcome = engine
            .execute(&params(temp.path()), &log, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(outcome, EngineOutcome::TimedOut);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "background child outlived the timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_execution_kills_process_group() {
        let temp = tempfile::TempDir::new().unwrap();
        let marker = temp.path().join("survived");
        let engine = CommandEngine::new("sh").with_args(vec![
            "-c".to_string(),
            format!("(sleep 2; touch '{}') & wait", marker.display()),
            "engine".to_string(),
        ]);
        let log = temp.path().join("execution.log");

        let run_params = params(temp.path());
        let run = engine.execute(&run_params, &log, Duration::from_secs(60));
        let cancelled = tokio::time::timeout(Duration::from_millis(300), run).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "background child outlived the cancelled job");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = CommandEngine::new("formsweep-no-such-engine-binary");
        let result = engine
            .execute(
                &params(temp.path()),
                &temp.path().join("execution.log"),
                Duration::from_secs(1),
            )
            .await;

        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }
}
