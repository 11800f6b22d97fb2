//! Advisory lock file guarding the experiment log.
//!
//! The lock is a file created with create-new semantics next to the log.
//! Holding the file means holding the lock; dropping the guard removes it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::LogError;

/// Retry policy for acquiring the log lock.
#[derive(Debug, Clone)]
pub struct LockPolicy {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the exponential backoff.
    pub max_backoff: Duration,
    /// A lock file older than this is considered abandoned and reclaimed.
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(500),
            stale_after: Duration::from_secs(60),
        }
    }
}

impl LockPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Held lock; the lock file is removed on drop if it is still ours.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
}

impl LockGuard {
    /// Unique token written into the lock file.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let ours = fs::read_to_string(&self.path)
            .map(|content| content.contains(&self.token))
            .unwrap_or(false);
        if ours {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Acquires the lock at `path`, retrying with exponential backoff.
pub async fn acquire(path: &Path, policy: &LockPolicy) -> Result<LockGuard, LogError> {
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        match try_create(path) {
            Ok(guard) => return Ok(guard),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if let Some(stale) = stale_contents(path, policy.stale_after) {
                    if reclaim(path, &stale) {
                        warn!(path = %path.display(), "Reclaimed stale log lock");
                        continue;
                    }
                }
                debug!(attempt = attempt, "Log lock busy, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(source) => {
                return Err(LogError::Write {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    Err(LogError::LockTimeout {
        path: path.to_path_buf(),
        attempts: policy.max_attempts,
    })
}

fn try_create(path: &Path) -> std::io::Result<LockGuard> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let token = Uuid::new_v4().to_string();
    let payload = format!(
        "pid={} token={} acquired_at={}\n",
        std::process::id(),
        token,
        Utc::now().to_rfc3339()
    );
    if let Err(e) = file.write_all(payload.as_bytes()).and_then(|_| file.flush()) {
        debug!(path = %path.display(), error = %e, "Failed to write lock payload");
        let _ = fs::remove_file(path);
        return Err(e);
    }

    Ok(LockGuard {
        path: path.to_path_buf(),
        token,
    })
}

/// Contents of the lock file if it is older than `stale_after`.
fn stale_contents(path: &Path, stale_after: Duration) -> Option<String> {
    let age = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()?
        .elapsed()
        .ok()?;
    if age <= stale_after {
        return None;
    }
    fs::read_to_string(path).ok()
}

/// Removes the lock file only if it still holds `expected`.
///
/// The file is first moved aside atomically. If a fresh lock took the
/// stale one's place in the meantime, it is linked back untouched.
fn reclaim(path: &Path, expected: &str) -> bool {
    let mut aside = path.as_os_str().to_os_string();
    aside.push(format!(".stale-{}", Uuid::new_v4()));
    let aside = PathBuf::from(aside);

    if fs::rename(path, &aside).is_err() {
        return false;
    }

    let moved = fs::read_to_string(&aside).unwrap_or_default();
    if moved == expected {
        let _ = fs::remove_file(&aside);
        return true;
    }

    if let Err(e) = fs::hard_link(&aside, path) {
        warn!(path = %path.display(), error = %e, "Failed to restore live log lock");
    }
    let _ = fs::remove_file(&aside);
    false
}
