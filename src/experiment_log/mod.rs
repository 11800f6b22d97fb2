//! Shared append-only experiment log.
//!
//! Every job of a batch reports into one line-oriented log file. Appends
//! are serialized at two levels:
//!
//! - an in-process async mutex orders the writers of this orchestrator;
//! - an advisory lock file next to the log excludes other processes.
//!
//! Both are held only for the duration of a single append, never across a
//! job's execution. Each append is a single write of whole lines, so the
//! log never contains a partial or interleaved line.
//!
//! # Example
//!
//! ```rust,ignore
//! use formsweep::experiment_log::ExperimentLog;
//!
//! let log = ExperimentLog::create("experiments/experiment_log.txt")?;
//! log.append("# batch started").await?;
//! log.append_block(&["=== START a ===".into(), "status: SUCCESS".into(), "=== END a ===".into()]).await?;
//! ```

pub mod format;
pub mod lock;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::LogError;

pub use format::{
    count_statuses, join_channels, parse_log, render_entry, LogEntry, StatusCounts,
};
pub use lock::LockPolicy;

/// Suffix of the lock file colocated with the log.
pub const LOCK_SUFFIX: &str = ".lock";

/// Handle to the shared experiment log.
#[derive(Debug)]
pub struct ExperimentLog {
    path: PathBuf,
    lock_path: PathBuf,
    policy: LockPolicy,
    writer: Mutex<()>,
}

impl ExperimentLog {
    /// Creates the log, truncating any previous content.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let log = Self::handle(path.into());
        log.ensure_parent()?;
        fs::File::create(&log.path).map_err(|source| LogError::Write {
            path: log.path.clone(),
            source,
        })?;
        Ok(log)
    }

    /// Opens the log for appending, creating it if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let log = Self::handle(path.into());
        log.ensure_parent()?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log.path)
            .map_err(|source| LogError::Write {
                path: log.path.clone(),
                source,
            })?;
        Ok(log)
    }

    fn handle(path: PathBuf) -> Self {
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(LOCK_SUFFIX);
        Self {
            lock_path: PathBuf::from(lock_name),
            path,
            policy: LockPolicy::default(),
            writer: Mutex::new(()),
        }
    }

    /// Sets the lock retry policy.
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Appends exactly one line.
    pub async fn append(&self, line: &str) -> Result<(), LogError> {
        if line.contains('\n') {
            return Err(LogError::MultilineEntry(line.to_string()));
        }
        self.write_locked(format!("{}\n", line)).await
    }

    /// Appends several lines as one uninterrupted block.
    pub async fn append_block(&self, lines: &[String]) -> Result<(), LogError> {
        let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            if line.contains('\n') {
                return Err(LogError::MultilineEntry(line.clone()));
            }
            text.push_str(line);
            text.push('\n');
        }
        if text.is_empty() {
            return Ok(());
        }
        self.write_locked(text).await
    }

    /// Reads and parses every job block currently in the log.
    pub fn read_entries(&self) -> Result<Vec<LogEntry>, LogError> {
        read_entries(&self.path)
    }

    async fn write_locked(&self, text: String) -> Result<(), LogError> {
        let _local = self.writer.lock().await;
        let _lock = lock::acquire(&self.lock_path, &self.policy).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(text.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn ensure_parent(&self) -> Result<(), LogError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|source| LogError::Write {
                    path: self.path.clone(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Reads and parses the log at `path`.
pub fn read_entries(path: &Path) -> Result<Vec<LogEntry>, LogError> {
    let text = fs::read_to_string(path).map_err(|source| LogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_log(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_lines() {
        let temp = TempDir::new().unwrap();
        let log = ExperimentLog::create(temp.path().join("experiment_log.txt")).unwrap();

        log.append("first").await.unwrap();
        log.append("second").await.unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
        assert!(!log.lock_path().exists());
        assert_eq!(
            log.lock_path().file_name().unwrap().to_string_lossy(),
            "experiment_log.txt.lock"
        );
    }

    #[tokio::test]
    async fn test_rejects_embedded_newline() {
        let temp = TempDir::new().unwrap();
        let log = ExperimentLog::create(temp.path().join("log.txt")).unwrap();

        let result = log.append("two\nlines").await;
        assert!(matches!(result, Err(LogError::MultilineEntry(_))));
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn test_create_truncates_and_open_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("log.txt");

        let log = ExperimentLog::create(&path).unwrap();
        log.append("old").await.unwrap();

        let reopened = ExperimentLog::open(&path).unwrap();
        reopened.append("kept").await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nkept\n");

        let fresh = ExperimentLog::create(&path).unwrap();
        fresh.append("new").await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_do_not_interleave() {
        const WRITERS: usize = 8;
        const LINES: usize = 50;

        let temp = TempDir::new().unwrap();
        let log = Arc::new(ExperimentLog::create(temp.path().join("log.txt")).unwrap());

        let mut handles = Vec::new();
        for writer in 0..WRITERS {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                for line in 0..LINES {
                    log.append(&format!("writer-{writer:02} line-{line:03} payload-xxxxxxxxxxxxxxxx"))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), WRITERS * LINES);

        let unique: HashSet<&str> = lines.iter().copied().collect();
        assert_eq!(unique.len(), WRITERS * LINES);
        for line in &lines {
            assert_eq!(line.matches("writer-").count(), 1, "interleaved line: {line}");
            assert!(line.ends_with("payload-xxxxxxxxxxxxxxxx"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_blocks_stay_contiguous() {
        let temp = TempDir::new().unwrap();
        let log = Arc::new(ExperimentLog::create(temp.path().join("log.txt")).unwrap());

        let mut handles = Vec::new();
        for job in 0..6 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let block = vec![
                    format!("=== START job{job} ==="),
                    format!("name: job{job}"),
                    "status: SUCCESS".to_string(),
                    format!("=== END job{job} ==="),
                ];
                log.append_block(&block).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = log.read_entries().unwrap();
        assert_eq!(entries.len(), 6);
        assert!(entries.iter().all(|e| e.complete));
        assert!(entries
            .iter()
            .all(|e| e.field("name") == Some(e.name.as_str())));
    }

    #[tokio::test]
    async fn test_held_lock_is_fatal() {
        let temp = TempDir::new().unwrap();
        let log = ExperimentLog::create(temp.path().join("log.txt"))
            .unwrap()
            .with_lock_policy(
                LockPolicy::default()
                    .with_max_attempts(2)
                    .with_backoff(
                        std::time::Duration::from_millis(1),
                        std::time::Duration::from_millis(1),
                    ),
            );
        fs::write(log.lock_path(), "held by another process").unwrap();

        let result = log.append("never written").await;
        assert!(matches!(result, Err(LogError::LockTimeout { .. })));
    }
}
