//! Batch summary built from the experiment log and output directories.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::{is_filesystem_safe, ExperimentDescriptor};
use crate::error::ReportError;
use crate::experiment_log::{count_statuses, read_entries, LogEntry};
use crate::runner::{JobStatus, RunConfig};

use super::metrics::MetricExtractor;

/// Default name of an experiment's results artifact.
pub const DEFAULT_RESULTS_FILE: &str = "results.txt";

/// Default name of the rendered summary.
pub const DEFAULT_SUMMARY_FILE: &str = "summary.txt";

/// Per-experiment section of the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub name: String,
    /// Last recorded status; `None` if the log has no entry.
    pub status: Option<JobStatus>,
    /// Results artifact relative to the output root.
    pub artifact: Option<PathBuf>,
    pub metrics: Vec<String>,
}

impl ExperimentSummary {
    fn status_label(&self) -> &'static str {
        self.status.map(|s| s.as_str()).unwrap_or("NOT RUN")
    }
}

/// Outcome of a batch as reconstructed from persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryReport {
    pub successful: usize,
    pub failed: usize,
    pub experiments: Vec<ExperimentSummary>,
}

impl SummaryReport {
    pub fn total(&self) -> usize {
        self.successful + self.failed
    }

    /// Renders the report as plain text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Experiment Summary");
        let _ = writeln!(out, "==================");
        let _ = writeln!(out, "Successful: {}", self.successful);
        let _ = writeln!(out, "Failed: {}", self.failed);
        let _ = writeln!(out);
        let _ = writeln!(out, "Results");
        let _ = writeln!(out, "-------");

        for experiment in &self.experiments {
            let _ = writeln!(out, "[{}] {}", experiment.name, experiment.status_label());
            match &experiment.artifact {
                None => {
                    let _ = writeln!(out, "  no results");
                }
                Some(_) if experiment.metrics.is_empty() => {
                    let _ = writeln!(out, "  no metrics found");
                }
                Some(_) => {
                    for line in &experiment.metrics {
                        let _ = writeln!(out, "  {}", line);
                    }
                }
            }
        }

        out
    }
}

/// Builds summaries for one output root.
#[derive(Debug, Clone)]
pub struct Reporter {
    output_root: PathBuf,
    log_path: PathBuf,
    results_file_name: String,
    summary_file_name: String,
    extractor: MetricExtractor,
}

impl Reporter {
    /// Creates a reporter with the default file names.
    pub fn new(output_root: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Result<Self, ReportError> {
        Ok(Self {
            output_root: output_root.into(),
            log_path: log_path.into(),
            results_file_name: DEFAULT_RESULTS_FILE.to_string(),
            summary_file_name: DEFAULT_SUMMARY_FILE.to_string(),
            extractor: MetricExtractor::new()?,
        })
    }

    /// Creates a reporter using the paths of `config`.
    pub fn from_config(config: &RunConfig) -> Result<Self, ReportError> {
        Ok(Self::new(&config.output_root, config.log_path())?
            .with_results_file_name(&config.results_file_name)
            .with_summary_file_name(&config.summary_file_name))
    }

    pub fn with_results_file_name(mut self, name: impl Into<String>) -> Self {
        self.results_file_name = name.into();
        self
    }

    pub fn with_summary_file_name(mut self, name: impl Into<String>) -> Self {
        self.summary_file_name = name.into();
        self
    }

    pub fn with_extractor(mut self, extractor: MetricExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_root.join(&self.summary_file_name)
    }

    /// Builds the report without writing it.
    pub fn build(&self, catalog: &[ExperimentDescriptor]) -> Result<SummaryReport, ReportError> {
        let entries = read_entries(&self.log_path)?;
        let counts = count_statuses(&entries);

        let mut names: Vec<&str> = catalog.iter().map(|d| d.name()).collect();
        let mut seen: HashSet<&str> = names.iter().copied().collect();
        for entry in &entries {
            if seen.insert(entry.name.as_str()) {
                names.push(entry.name.as_str());
            }
        }

        let mut experiments = Vec::with_capacity(names.len());
        for name in names {
            experiments.push(self.experiment(name, &entries)?);
        }

        Ok(SummaryReport {
            successful: counts.successful,
            failed: counts.failed,
            experiments,
        })
    }

    /// Builds the report and writes it to the summary file.
    pub fn summarize(&self, catalog: &[ExperimentDescriptor]) -> Result<SummaryReport, ReportError> {
        let report = self.build(catalog)?;
        let path = self.summary_path();
        fs::write(&path, report.render())
            .map_err(|source| ReportError::WriteSummary { path: path.clone(), source })?;

        info!(
            path = %path.display(),
            successful = report.successful,
            failed = report.failed,
            "Summary written"
        );
        Ok(report)
    }

    fn experiment(&self, name: &str, entries: &[LogEntry]) -> Result<ExperimentSummary, ReportError> {
        let status = entries
            .iter()
            .rev()
            .find(|e| e.name == name)
            .and_then(|e| e.status);

        let artifact = if is_filesystem_safe(name) {
            self.find_artifact(name)
        } else {
            warn!(experiment = %name, "Log entry name is not a plain directory name, skipping artifact lookup");
            None
        };
        let Some(artifact) = artifact else {
            debug!(experiment = %name, "No results artifact");
            return Ok(ExperimentSummary {
                name: name.to_string(),
                status,
                artifact: None,
                metrics: Vec::new(),
            });
        };

        let bytes = fs::read(&artifact).map_err(|source| ReportError::ReadArtifact {
            path: artifact.clone(),
            source,
        })?;
        let metrics = self.extractor.extract(&String::from_utf8_lossy(&bytes));
        let relative = match artifact.strip_prefix(&self.output_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => artifact.clone(),
        };

        Ok(ExperimentSummary {
            name: name.to_string(),
            status,
            artifact: Some(relative),
            metrics,
        })
    }

    /// Locates the results artifact at the top of the experiment's
    /// directory, falling back to the first match in sorted traversal.
    fn find_artifact(&self, name: &str) -> Option<PathBuf> {
        let dir = self.output_root.join(name);
        let direct = dir.join(&self.results_file_name);
        if direct.is_file() {
            return Some(direct);
        }
        if !dir.is_dir() {
            return None;
        }

        WalkDir::new(&dir)
            .min_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.file_name() == self.results_file_name.as_str())
            .map(|e| e.into_path())
    }
}

/// Summarizes the batch under `output_root` and writes its summary file.
pub fn summarize(
    output_root: &Path,
    catalog: &[ExperimentDescriptor],
    log_path: &Path,
) -> Result<SummaryReport, ReportError> {
    Reporter::new(output_root, log_path)?.summarize(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Target;
    use tempfile::TempDir;

    const LOG: &str = "\
# batch 1 started
=== START direct_ironing ===
name: direct_ironing
status: SUCCESS
=== END direct_ironing ===
=== START signal_4_ironing ===
name: signal_4_ironing
status: FAILED
=== END signal_4_ironing ===
=== START legacy_run ===
name: legacy_run
status: SUCCESS
=== END legacy_run ===
";

    fn catalog() -> Vec<ExperimentDescriptor> {
        vec![
            ExperimentDescriptor::group("direct_ironing", "DIRECT", Target::Ironing),
            ExperimentDescriptor::channels("signal_4_ironing", vec![4], Target::Ironing),
            ExperimentDescriptor::channels("signal_5_ironing", vec![5], Target::Ironing),
        ]
    }

    fn setup() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("experiment_log.txt"), LOG).unwrap();
        fs::create_dir_all(root.join("direct_ironing")).unwrap();
        fs::write(
            root.join("direct_ironing/results.txt"),
            "epochs: 10\ntest_acc: 0.91\n  test_f1 = 0.89\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("signal_4_ironing")).unwrap();
        temp
    }

    #[test]
    fn test_summary_counts_and_metrics() {
        let temp = setup();
        let root = temp.path();
        let report = summarize(root, &catalog(), &root.join("experiment_log.txt")).unwrap();

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 3);

        let direct = &report.experiments[0];
        assert_eq!(direct.name, "direct_ironing");
        assert_eq!(direct.metrics, vec!["test_acc: 0.91", "test_f1 = 0.89"]);
        assert_eq!(direct.artifact, Some(PathBuf::from("direct_ironing/results.txt")));

        let text = fs::read_to_string(root.join("summary.txt")).unwrap();
        assert!(text.contains("Successful: 2"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("test_acc: 0.91"));
        assert!(!text.contains("epochs"));
    }

    #[test]
    fn test_missing_artifact_reports_no_results() {
        let temp = setup();
        let root = temp.path();
        let report = summarize(root, &catalog(), &root.join("experiment_log.txt")).unwrap();

        let rendered = report.render();
        assert!(rendered.contains("[signal_4_ironing] FAILED\n  no results"));
        assert!(rendered.contains("[signal_5_ironing] NOT RUN\n  no results"));
    }

    #[test]
    fn test_entries_outside_catalog_listed_last() {
        let temp = setup();
        let root = temp.path();
        let report = summarize(root, &catalog(), &root.join("experiment_log.txt")).unwrap();

        let names: Vec<&str> = report.experiments.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["direct_ironing", "signal_4_ironing", "signal_5_ironing", "legacy_run"]
        );
    }

    #[test]
    fn test_nested_artifact_found() {
        let temp = setup();
        let root = temp.path();
        fs::create_dir_all(root.join("signal_4_ironing/run/metrics")).unwrap();
        fs::write(root.join("signal_4_ironing/run/metrics/results.txt"), "loss=0.4\n").unwrap();

        let report = summarize(root, &catalog(), &root.join("experiment_log.txt")).unwrap();
        assert_eq!(report.experiments[1].metrics, vec!["loss=0.4"]);
    }

    #[test]
    fn test_summary_is_deterministic() {
        let temp = setup();
        let root = temp.path();
        let log = root.join("experiment_log.txt");

        summarize(root, &catalog(), &log).unwrap();
        let first = fs::read_to_string(root.join("summary.txt")).unwrap();
        summarize(root, &catalog(), &log).unwrap();
        let second = fs::read_to_string(root.join("summary.txt")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_file_names() {
        let temp = setup();
        let root = temp.path();
        fs::write(root.join("direct_ironing/scores.txt"), "acc: 1.0\n").unwrap();

        let reporter = Reporter::new(root, root.join("experiment_log.txt"))
            .unwrap()
            .with_results_file_name("scores.txt")
            .with_summary_file_name("report.txt");
        let report = reporter.summarize(&catalog()).unwrap();

        assert_eq!(report.experiments[0].metrics, vec!["acc: 1.0"]);
        assert!(root.join("report.txt").is_file());
    }

    #[test]
    fn test_unsafe_log_names_stay_inside_output_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("out");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(temp.path().join("escape")).unwrap();
        fs::write(temp.path().join("escape/results.txt"), "test_acc: 0.99\n").unwrap();
        fs::write(
            root.join("experiment_log.txt"),
            "=== START ../escape ===\nstatus: SUCCESS\n=== END ../escape ===\n",
        )
        .unwrap();

        let report = summarize(&root, &[], &root.join("experiment_log.txt")).unwrap();

        assert_eq!(report.successful, 1);
        let escaped = &report.experiments[0];
        assert_eq!(escaped.name, "../escape");
        assert!(escaped.artifact.is_none());
        assert!(escaped.metrics.is_empty());
        assert!(report.render().contains("[../escape] SUCCESS\n  no results"));
    }

    #[test]
    fn test_missing_log_is_error() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let result = summarize(root, &catalog(), &root.join("experiment_log.txt"));
        assert!(matches!(result, Err(ReportError::Log(_))));
    }
}
