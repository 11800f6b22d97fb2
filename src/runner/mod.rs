//! Job runner for experiment execution.
//!
//! This module runs a single experiment descriptor against the external
//! experiment engine and records its outcome.
//!
//! # Architecture
//!
//! ```text
//! Descriptor → EngineParams → Engine process → Output directory
//!                                  │
//!                                  └─ exit status → JobResult → Experiment log
//! ```
//!
//! The runner:
//! 1. Creates the experiment's output directory
//! 2. Derives a typed parameter set from the descriptor and shared config
//! 3. Runs the engine under a hard timeout, capturing its output
//! 4. Classifies the outcome by exit status alone
//! 5. Appends one block to the shared experiment log
//!
//! # Example
//!
//! ```ignore
//! use formsweep::runner::{CommandEngine, JobRunner, RunConfig};
//!
//! let config = Arc::new(RunConfig::new("./experiments"));
//! let engine = Arc::new(CommandEngine::papermill("analysis.ipynb"));
//! let log = Arc::new(ExperimentLog::create(config.log_path())?);
//!
//! let runner = JobRunner::new(config, engine, log);
//! let result = runner.run(descriptor).await?;
//! println!("{}: {}", result.name(), result.status);
//! ```

pub mod config;
pub mod engine;
pub mod executor;
pub mod params;
pub mod result;

pub use config::{OptionalSettings, RunConfig, DEFAULT_TIMEOUT_SECS};
pub use engine::{CommandEngine, EngineError, EngineOutcome, ExperimentEngine, ParamStyle};
pub use executor::JobRunner;
pub use params::{resolve_channels, EngineParams, ParamValue};
pub use result::{JobResult, JobStatus};
