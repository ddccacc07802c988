//! Per-project writer lock (spec.md §5: "one writer per collection at a
//! time, enforced by a per-project file lock ... lock contains a PID;
//! stale locks older than a configurable threshold are reclaimable").

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use engine_model::config::LockConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("writer lock at `{path}` is held (pid {pid}, acquired {acquired_at})")]
    Held { path: PathBuf, pid: u32, acquired_at: DateTime<Utc> },
    #[error("io error managing writer lock at `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

impl From<LockError> for engine_model::EngineError {
    fn from(err: LockError) -> Self {
        engine_model::EngineError::configuration(err.to_string())
            .with_hint("wait for the other indexing session to finish, or remove the lock file if it is truly abandoned")
    }
}

/// Held for the duration of one indexing session. Releases (deletes the
/// lock file) on drop, including on an early return from a failed
/// operation, so a crash mid-session leaves only a file a later
/// `stale_after`-based reclaim will clear.
pub struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    pub fn acquire(project_root: &Path, config: &LockConfig) -> Result<Self, LockError> {
        let path = lock_path(project_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io { path: parent.to_path_buf(), source })?;
        }

        if let Ok(bytes) = fs::read(&path) {
            if let Ok(existing) = serde_json::from_slice::<LockRecord>(&bytes) {
                let age = Utc::now().signed_duration_since(existing.acquired_at);
                let stale = age.to_std().map(|d| d > config.stale_after).unwrap_or(true);
                if !stale {
                    return Err(LockError::Held { path, pid: existing.pid, acquired_at: existing.acquired_at });
                }
                tracing::warn!(pid = existing.pid, "reclaiming stale writer lock");
            }
        }

        let record = LockRecord { pid: std::process::id(), acquired_at: Utc::now() };
        let bytes = serde_json::to_vec_pretty(&record).expect("LockRecord always serialises");
        fs::write(&path, bytes).map_err(|source| LockError::Io { path: path.clone(), source })?;
        Ok(Self { path })
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path(project_root: &Path) -> PathBuf {
    project_root.join(".index").join("writer.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> LockConfig {
        LockConfig { stale_after: Duration::from_secs(1800) }
    }

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = WriterLock::acquire(dir.path(), &config()).unwrap();
        let err = WriterLock::acquire(dir.path(), &config()).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));
        drop(first);
    }

    #[test]
    fn lock_is_reacquirable_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let first = WriterLock::acquire(dir.path(), &config()).unwrap();
        drop(first);
        let second = WriterLock::acquire(dir.path(), &config());
        assert!(second.is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let ancient = LockRecord { pid: 999_999, acquired_at: Utc::now() - chrono::Duration::hours(2) };
        fs::write(&path, serde_json::to_vec(&ancient).unwrap()).unwrap();

        let zero_stale = LockConfig { stale_after: Duration::from_secs(0) };
        let result = WriterLock::acquire(dir.path(), &zero_stale);
        assert!(result.is_ok());
    }
}
