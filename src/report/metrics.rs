//! Metric line extraction from results artifacts.

use regex::Regex;

use crate::error::ReportError;

/// Metric keys recognised by default.
pub const DEFAULT_METRIC_KEYS: [&str; 3] = ["acc", "f1", "loss"];

/// Picks metric lines out of free-form engine output.
///
/// A metric line has a key containing one of the configured fragments
/// (case-insensitive), then `:` or `=`, then a number.
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    pattern: Regex,
}

impl MetricExtractor {
    /// Creates an extractor for accuracy, F1 and loss lines.
    pub fn new() -> Result<Self, ReportError> {
        Self::with_keys(&DEFAULT_METRIC_KEYS)
    }

    /// Creates an extractor for keys containing any of `keys`.
    pub fn with_keys(keys: &[&str]) -> Result<Self, ReportError> {
        let alternatives: Vec<String> = keys.iter().map(|k| regex::escape(k)).collect();
        let pattern = Regex::new(&format!(
            r"(?i)^[^:=]*(?:{})[^:=]*[:=]\s*[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:e[-+]?\d+)?",
            alternatives.join("|")
        ))?;
        Ok(Self { pattern })
    }

    /// Whether `line` is a metric line.
    pub fn is_metric(&self, line: &str) -> bool {
        self.pattern.is_match(line.trim())
    }

    /// Returns every metric line of `text`, trimmed, in order.
    pub fn extract(&self, text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| self.pattern.is_match(line))
            .map(str::to_string)
            .collect()
    }
}
