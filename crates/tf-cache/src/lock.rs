//! Per-entry lock files.
//!
//! A clone takes `<root>/.<cache_key>.lock` with `O_CREAT | O_EXCL` before it
//! clears a stale entry or writes a new one, so two processes cloning the
//! same URL never delete each other's work. The file is removed when the
//! [`EntryLock`] is dropped. A lock older than its stale threshold belongs
//! to a crashed holder and is taken over.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tf_core::error::{Result, TaskError};
use tracing::{debug, info};

/// Path of the lock file guarding `key` under `root`.
pub fn lock_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!(".{key}.lock"))
}

#[derive(Debug)]
pub struct EntryLock {
    path: PathBuf,
}

impl EntryLock {
    /// Take the lock for `key`, or fail with a repository error when a live
    /// holder has it.
    pub fn acquire(root: &Path, key: &str, stale_after: Duration) -> Result<Self> {
        let path = lock_path(root, key);
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(lock = %path.display(), "cache entry locked");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !is_stale(&path, stale_after) {
                        return Err(TaskError::repository(format!(
                            "cache entry {key} is locked by another operation"
                        )));
                    }
                    info!(lock = %path.display(), "removing stale cache lock");
                    let _ = std::fs::remove_file(&path);
                }
                Err(e) => {
                    return Err(TaskError::repository(format!(
                        "failed to create lock {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Err(TaskError::repository(format!(
            "failed to lock cache entry {key} after stale lock removal"
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        // vanished between create and stat; let the next attempt decide
        Err(_) => return true,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn second_holder_is_refused_until_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let first = EntryLock::acquire(tmp.path(), "repo_abc", Duration::from_secs(60)).unwrap();
        assert!(first.path().exists());

        let err = EntryLock::acquire(tmp.path(), "repo_abc", Duration::from_secs(60)).unwrap_err();
        assert!(err.message().contains("locked"));

        drop(first);
        assert!(!lock_path(tmp.path(), "repo_abc").exists());
        assert!(EntryLock::acquire(tmp.path(), "repo_abc", Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let tmp = tempfile::tempdir().unwrap();
        let path = lock_path(tmp.path(), "repo_abc");
        std::fs::write(&path, "999999\n").unwrap();
        File::open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let lock = EntryLock::acquire(tmp.path(), "repo_abc", Duration::from_secs(60)).unwrap();
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let tmp = tempfile::tempdir().unwrap();
        let _a = EntryLock::acquire(tmp.path(), "a_1", Duration::from_secs(60)).unwrap();
        assert!(EntryLock::acquire(tmp.path(), "b_2", Duration::from_secs(60)).is_ok());
    }
}
