//! formsweep: batch orchestrator for sheet-metal forming classification
//! experiments.
//!
//! This library builds a catalog of experiment descriptors (single sensor
//! channels and named channel groups, each for the Ironing and DeepDrawing
//! targets), runs each one through an external analysis engine with bounded
//! concurrency, records every outcome in a shared experiment log, and
//! summarizes the batch from persisted state.

pub mod catalog;
pub mod cli;
pub mod error;
pub mod experiment_log;
pub mod report;
pub mod runner;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{CatalogError, ConfigError, LogError, ReportError};
pub use runner::EngineError;
pub use scheduler::SchedulerError;
