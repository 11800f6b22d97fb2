//! Batch summary reporting.
//!
//! After every job has finished, the reporter reconstructs the batch outcome
//! from persisted state only: success and failure counts come from the
//! experiment log, metric lines from each experiment's results artifact.
//! The rendered summary contains no timestamps, so regenerating it from the
//! same files yields the same text.

pub mod metrics;
pub mod summary;

pub use metrics::{MetricExtractor, DEFAULT_METRIC_KEYS};
pub use summary::{
    summarize, ExperimentSummary, Reporter, SummaryReport, DEFAULT_RESULTS_FILE,
    DEFAULT_SUMMARY_FILE,
};
