//! Error types for formsweep operations.
//!
//! Defines error types for the orchestrator's subsystems:
//! - Catalog construction and custom descriptor loading
//! - The shared experiment log
//! - Run configuration validation
//! - Summary generation
//!
//! Job failures are not errors: a failing experiment is recorded as a
//! `FAILED` job result and never surfaces through these types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the experiment catalog.
///
/// All of these are detected before any job is dispatched.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Descriptor '{name}' has an empty channel selector")]
    EmptySelector { name: String },

    #[error("Descriptor '{name}' uses reserved channel {channel} (channels 0 and 6 are excluded)")]
    ReservedChannel { name: String, channel: u8 },

    #[error("Descriptor '{name}' uses channel {channel}, valid channels are 1..={max}")]
    ChannelOutOfRange { name: String, channel: u8, max: u8 },

    #[error("Descriptor '{name}' lists channel {channel} more than once")]
    DuplicateChannel { name: String, channel: u8 },

    #[error("Descriptor '{name}' references unknown channel group '{group}'")]
    UnknownGroup { name: String, group: String },

    #[error("Invalid experiment name '{0}': must be non-empty and contain only alphanumeric characters, hyphens, underscores and dots")]
    InvalidName(String),

    #[error("Experiment name '{0}' appears more than once in the catalog")]
    DuplicateName(String),

    #[error("Invalid channel group '{group}': {reason}")]
    InvalidGroup { group: String, reason: String },

    #[error("Invalid custom descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("Failed to read custom descriptors from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised by the shared experiment log.
///
/// The log is the only execution record of a batch, so every one of these
/// is fatal to the orchestrator.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Could not acquire log lock {path} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error("Failed to write experiment log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read experiment log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log line must not contain a newline: {0:?}")]
    MultilineEntry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while validating the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while producing the batch summary.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Failed to read results artifact {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write summary {path}: {source}")]
    WriteSummary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metric pattern: {0}")]
    Pattern(#[from] regex::Error),
}
