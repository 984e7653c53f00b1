use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use tf_core::config::CacheConfig;
use tf_core::error::{Result, TaskError};
use tf_core::git::{GitOutput, GitRunError, GitRunner, ShellGitRunner};
use tf_telemetry::metrics::{global_metrics, MetricsCollector, CACHE_ENTRIES};
use tf_telemetry::status::{elapsed_ms, ExecutionStatus};
use tracing::{debug, info, warn};

use crate::fs_stats::{changed_at, to_utc, tree_stats};
use crate::keys::{cache_key, validate_repository_url};
use crate::types::{
    CacheCheck, CacheEntryInfo, CacheLookupStatus, CacheStatistics, CleanupReport,
    PerformanceMetrics, METADATA_TARGET_MS,
};

pub const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_MAX_AGE_HOURS: u64 = 24;

// ---------------------------------------------------------------------------
// RepositoryCache
// ---------------------------------------------------------------------------

/// Owner of the cache root and every entry beneath it.
///
/// All methods take `&self`; one instance can be shared between tasks.
/// Creating the same entry concurrently is safe because creation treats
/// "already exists" as success.
pub struct RepositoryCache {
    root: PathBuf,
    runner: Arc<dyn GitRunner>,
    dir_mode: u32,
    pub(crate) clone_timeout: Duration,
    pub(crate) fetch_timeout: Duration,
    pub(crate) validate_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RepositoryCache {
    /// Cache rooted at `root`, driving the real `git` binary.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_git_runner(root, Arc::new(ShellGitRunner))
    }

    /// Cache with a custom git runner (for testing).
    pub fn with_git_runner(root: impl Into<PathBuf>, git: Arc<dyn GitRunner>) -> Self {
        Self {
            root: root.into(),
            runner: git,
            dir_mode: DEFAULT_DIR_MODE,
            clone_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
            validate_timeout: Duration::from_secs(10),
            metrics: None,
        }
    }

    pub fn from_config(cfg: &CacheConfig, git: Arc<dyn GitRunner>) -> Self {
        Self {
            root: PathBuf::from(&cfg.root),
            runner: git,
            dir_mode: cfg.dir_mode,
            clone_timeout: Duration::from_secs(cfg.clone_timeout_secs),
            fetch_timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            validate_timeout: Duration::from_secs(cfg.validate_timeout_secs),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_clone_timeout(&self) -> Duration {
        self.clone_timeout
    }

    pub fn default_fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn default_validate_timeout(&self) -> Duration {
        self.validate_timeout
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        match &self.metrics {
            Some(m) => m,
            None => global_metrics(),
        }
    }

    // -----------------------------------------------------------------------
    // Directory lifecycle
    // -----------------------------------------------------------------------

    /// Create (or return) the cache directory for `url`.
    ///
    /// Idempotent: an existing directory is returned untouched. New
    /// directories get the configured mode (0755 by default).
    pub fn create_cache_directory(&self, url: &str) -> Result<PathBuf> {
        let start = Instant::now();
        let key = cache_key(url)?;
        let path = self.root.join(&key);

        if path.is_dir() {
            info!(
                cache_key = %key,
                path = %path.display(),
                status = %ExecutionStatus::Skipped,
                "cache directory already exists, skipped"
            );
            return Ok(path);
        }

        std::fs::create_dir_all(&self.root).map_err(|e| {
            TaskError::repository(format!(
                "failed to create cache root {}: {e}",
                self.root.display()
            ))
        })?;

        match std::fs::create_dir(&path) {
            Ok(()) => {}
            // lost a race with another creator; their directory is as good as ours
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                info!(
                    cache_key = %key,
                    status = %ExecutionStatus::Skipped,
                    "cache directory created concurrently, skipped"
                );
                return Ok(path);
            }
            Err(e) => {
                return Err(TaskError::repository(format!(
                    "failed to create cache directory {}: {e}",
                    path.display()
                )))
            }
        }
        self.apply_dir_mode(&path)?;

        let duration_ms = elapsed_ms(start);
        self.metrics()
            .record_operation("create_cache_directory", "success", duration_ms);
        info!(
            cache_key = %key,
            path = %path.display(),
            duration_ms,
            status = %ExecutionStatus::Completed,
            "cache directory created"
        );
        Ok(path)
    }

    pub(crate) fn apply_dir_mode(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.dir_mode))
                .map_err(|e| {
                    TaskError::repository(format!(
                        "failed to set permissions on {}: {e}",
                        path.display()
                    ))
                })?;
        }
        #[cfg(not(unix))]
        let _ = path;
        Ok(())
    }

    /// Path of the cache entry for `url`, whether or not it exists.
    pub fn get_cache_directory(&self, url: &str) -> Result<PathBuf> {
        Ok(self.root.join(cache_key(url)?))
    }

    /// Whether the entry for `url` exists. Invalid URLs yield `false`.
    pub fn directory_exists(&self, url: &str) -> bool {
        match self.get_cache_directory(url) {
            Ok(path) => path.is_dir(),
            Err(e) => {
                debug!(error = %e, "directory_exists on invalid url");
                false
            }
        }
    }

    /// Remove the entry for `url`. Returns `false` when there was none.
    pub fn remove_cache_directory(&self, url: &str) -> Result<bool> {
        let path = self.get_cache_directory(url)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&path).map_err(|e| {
            TaskError::repository(format!(
                "failed to remove cache directory {}: {e}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "cache directory removed");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Cache hit/miss for `url` with basic metadata on a hit.
    pub fn check_repository_existence(&self, url: &str) -> Result<CacheCheck> {
        let start = Instant::now();
        validate_repository_url(url)?;
        let key = cache_key(url)?;
        let path = self.root.join(&key);

        let meta = std::fs::metadata(&path).ok().filter(|m| m.is_dir());
        let exists = meta.is_some();
        let (size_bytes, accessed_at, modified_at) = match &meta {
            Some(m) => (
                Some(tree_stats(&path, false).size_bytes),
                to_utc(m.accessed()),
                to_utc(m.modified()),
            ),
            None => (None, None, None),
        };

        let duration_ms = elapsed_ms(start);
        let status = if exists {
            CacheLookupStatus::CacheHit
        } else {
            CacheLookupStatus::CacheMiss
        };
        debug!(cache_key = %key, ?status, duration_ms, "repository existence checked");

        Ok(CacheCheck {
            exists_in_cache: exists,
            cache_path: path,
            cache_key: key,
            validation_status: status,
            size_bytes,
            accessed_at,
            modified_at,
            performance_metrics: PerformanceMetrics::new(duration_ms, METADATA_TARGET_MS),
        })
    }

    /// Detailed metadata for the entry, or `None` when it does not exist.
    pub fn get_repository_cache_info(&self, url: &str) -> Result<Option<CacheEntryInfo>> {
        let key = cache_key(url)?;
        let path = self.root.join(&key);
        let meta = match std::fs::metadata(&path) {
            Ok(m) if m.is_dir() => m,
            _ => return Ok(None),
        };

        let stats = tree_stats(&path, false);
        let git_dir = path.join(".git");
        let is_git = git_dir.is_dir();
        Ok(Some(CacheEntryInfo {
            cache_key: key,
            size_bytes: stats.size_bytes,
            file_count: stats.file_count,
            modified_at: to_utc(meta.modified()),
            accessed_at: to_utc(meta.accessed()),
            changed_at: changed_at(&meta),
            is_git_repository: is_git,
            is_valid: is_git && git_layout_valid(&path),
            path,
        }))
    }

    /// Totals across every entry under the root.
    pub fn get_cache_statistics(&self) -> Result<CacheStatistics> {
        let mut stats = CacheStatistics {
            cache_root: self.root.clone(),
            root_exists: self.root.is_dir(),
            total_directories: 0,
            git_repositories: 0,
            total_size_bytes: 0,
            total_files: 0,
            oldest_modified_at: None,
            newest_modified_at: None,
        };
        if !stats.root_exists {
            return Ok(stats);
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            TaskError::repository(format!("failed to read cache root: {e}"))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            stats.total_directories += 1;
            if path.join(".git").is_dir() {
                stats.git_repositories += 1;
            }
            let tree = tree_stats(&path, false);
            stats.total_size_bytes += tree.size_bytes;
            stats.total_files += tree.file_count;

            if let Some(modified) = entry.metadata().ok().and_then(|m| to_utc(m.modified())) {
                stats.oldest_modified_at = Some(
                    stats
                        .oldest_modified_at
                        .map_or(modified, |o: DateTime<Utc>| o.min(modified)),
                );
                stats.newest_modified_at = Some(
                    stats
                        .newest_modified_at
                        .map_or(modified, |n: DateTime<Utc>| n.max(modified)),
                );
            }
        }

        self.metrics()
            .set_gauge(CACHE_ENTRIES, stats.total_directories as i64);
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Remove immediate children of the root whose mtime is older than
    /// `max_age_hours`. Per-entry failures are counted, never fatal.
    pub fn cleanup_old_directories(&self, max_age_hours: u64) -> Result<CleanupReport> {
        let start = Instant::now();
        let mut report = CleanupReport::default();

        if !self.root.is_dir() {
            return Ok(report);
        }

        // an age beyond the representable range keeps everything
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(max_age_hours.saturating_mul(3600)))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            TaskError::repository(format!("failed to read cache root: {e}"))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            report.directories_checked += 1;

            let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    report.errors += 1;
                    report.error_details.push(format!("{}: {e}", path.display()));
                    warn!(path = %path.display(), error = %e, "cannot stat cache entry");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            let size = tree_stats(&path, false).size_bytes;
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    report.directories_removed += 1;
                    report.bytes_freed += size;
                    info!(path = %path.display(), bytes = size, "removed stale cache entry");
                }
                Err(e) => {
                    report.errors += 1;
                    report.error_details.push(format!("{}: {e}", path.display()));
                    warn!(path = %path.display(), error = %e, "failed to remove stale cache entry");
                }
            }
        }

        let duration_ms = elapsed_ms(start);
        self.metrics().record_operation("cleanup", "success", duration_ms);
        info!(
            checked = report.directories_checked,
            removed = report.directories_removed,
            bytes_freed = report.bytes_freed,
            errors = report.errors,
            duration_ms,
            "cache cleanup finished"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // git helpers
    // -----------------------------------------------------------------------

    /// Run git, mapping spawn failures and timeouts to repository errors.
    pub(crate) async fn git(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<GitOutput> {
        self.runner
            .run_git(dir, args, timeout)
            .await
            .map_err(|e| match e {
                GitRunError::Timeout { .. } => TaskError::repository(e.to_string()),
                GitRunError::Spawn(msg) => {
                    TaskError::repository(format!("failed to run git: {msg}"))
                }
            })
    }
}

/// `.git/HEAD`, `.git/objects` and `.git/refs` are all present.
pub(crate) fn git_layout_valid(path: &Path) -> bool {
    let git = path.join(".git");
    path.is_dir()
        && git.join("HEAD").is_file()
        && git.join("objects").is_dir()
        && git.join("refs").is_dir()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://github.com/org/repo.git";

    #[test]
    fn create_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = RepositoryCache::new(tmp.path().join("repos"));

        let first = cache.create_cache_directory(URL).unwrap();
        std::fs::write(first.join("marker"), "keep").unwrap();
        let second = cache.create_cache_directory(URL).unwrap();

        assert_eq!(first, second);
        assert!(second.join("marker").exists());
    }

    #[cfg(unix)]
    #[test]
    fn created_directory_has_mode_0755() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let cache = RepositoryCache::new(tmp.path());
        let path = cache.create_cache_directory(URL).unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn directory_exists_never_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = RepositoryCache::new(tmp.path());
        assert!(!cache.directory_exists("ftp://nope"));
        assert!(!cache.directory_exists(URL));
        cache.create_cache_directory(URL).unwrap();
        assert!(cache.directory_exists(URL));
    }

    #[test]
    fn git_layout_requires_objects_and_refs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git/objects")).unwrap();
        std::fs::write(tmp.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        assert!(!git_layout_valid(tmp.path()));
        std::fs::create_dir_all(tmp.path().join(".git/refs")).unwrap();
        assert!(git_layout_valid(tmp.path()));
    }
}
