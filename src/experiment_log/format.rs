//! Line format of the experiment log.
//!
//! Each job writes one block:
//!
//! ```text
//! === START signal_1_ironing ===
//! name: signal_1_ironing
//! portion: single
//! channels: 1
//! target: Ironing
//! started_at: 2024-05-02T10:00:00+00:00
//! ended_at: 2024-05-02T10:42:13+00:00
//! exit_code: 0
//! timed_out: false
//! execution_log: experiments/signal_1_ironing/execution.log
//! status: SUCCESS
//! === END signal_1_ironing ===
//! ```
//!
//! Lines outside a block are ignored by the parser. A block cut short
//! before its END marker still yields an entry.

use crate::runner::{JobResult, JobStatus};

const START_PREFIX: &str = "=== START ";
const END_PREFIX: &str = "=== END ";
const MARKER_SUFFIX: &str = " ===";

/// One parsed job block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Experiment name from the START marker.
    pub name: String,
    /// Parsed `status:` line, if present and valid.
    pub status: Option<JobStatus>,
    /// All `key: value` lines of the block, in order.
    pub fields: Vec<(String, String)>,
    /// Whether the END marker was seen.
    pub complete: bool,
}

impl LogEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: None,
            fields: Vec::new(),
            complete: false,
        }
    }

    /// First value recorded for `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Renders the log block of a finished job.
///
/// `channels` is the resolved channel list passed to the engine.
pub fn render_entry(result: &JobResult, channels: &[u8]) -> Vec<String> {
    let descriptor = &result.descriptor;
    let mut lines = Vec::with_capacity(13);

    lines.push(format!("{}{}{}", START_PREFIX, descriptor.name(), MARKER_SUFFIX));
    lines.push(format!("name: {}", descriptor.name()));
    lines.push(format!("portion: {}", descriptor.portion_kind()));
    lines.push(format!("channels: {}", join_channels(channels)));
    if let Some(tag) = descriptor.group_tag() {
        lines.push(format!("group: {}", tag));
    }
    lines.push(format!("target: {}", descriptor.target()));
    lines.push(format!("started_at: {}", result.started_at.to_rfc3339()));
    lines.push(format!("ended_at: {}", result.ended_at.to_rfc3339()));
    lines.push(format!(
        "exit_code: {}",
        result
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string())
    ));
    lines.push(format!("timed_out: {}", result.timed_out));
    lines.push(format!("execution_log: {}", result.log_path.display()));
    if let Some(ref error) = result.error {
        lines.push(format!("error: {}", single_line(error)));
    }
    lines.push(format!("status: {}", result.status));
    lines.push(format!("{}{}{}", END_PREFIX, descriptor.name(), MARKER_SUFFIX));

    lines
}

/// Parses every job block in `text`.
pub fn parse_log(text: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut current: Option<LogEntry> = None;

    for line in text.lines() {
        if let Some(name) = marker_name(line, START_PREFIX) {
            if let Some(open) = current.take() {
                entries.push(open);
            }
            current = Some(LogEntry::new(name));
            continue;
        }

        if let Some(name) = marker_name(line, END_PREFIX) {
            if let Some(mut open) = current.take() {
                open.complete = open.name == name;
                entries.push(open);
            }
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if key == "status" && entry.status.is_none() {
                entry.status = value.parse().ok();
            }
            entry.fields.push((key.to_string(), value.to_string()));
        }
    }

    if let Some(open) = current {
        entries.push(open);
    }

    entries
}

/// Success and failure counts over parsed entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub successful: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.successful + self.failed
    }
}

/// Counts status markers; entries without a status are not counted.
pub fn count_statuses(entries: &[LogEntry]) -> StatusCounts {
    entries
        .iter()
        .fold(StatusCounts::default(), |mut counts, entry| {
            match entry.status {
                Some(JobStatus::Success) => counts.successful += 1,
                Some(JobStatus::Failed) => counts.failed += 1,
                None => {}
            }
            counts
        })
}

/// Formats channels as `1,2,3`.
pub fn join_channels(channels: &[u8]) -> String {
    channels
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn marker_name<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.trim_end()
        .strip_prefix(prefix)?
        .strip_suffix(MARKER_SUFFIX)
        .map(str::trim)
}

fn single_line(text: &str) -> String {
    text.lines().map(str::trim).collect::<Vec<_>>().join(" | ")
}
