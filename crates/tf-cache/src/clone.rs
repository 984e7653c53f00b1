use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tf_core::error::{Result, TaskError};
use tf_telemetry::status::{elapsed_ms, ExecutionStatus};
use tf_telemetry::tracing_setup::cache_span;
use tracing::{info, warn, Instrument};

use crate::engine::RepositoryCache;
use crate::fs_stats::{is_non_empty_dir, tree_stats};
use crate::lock::EntryLock;
use crate::keys::{authenticated_url, cache_key, redact, validate_repository_url, TOKEN_SCHEMES};
use crate::types::{CloneOutcome, CloneStatus, FetchOutcome, FetchStatus, PerformanceMetrics};

/// Latency target for a clone or fetch round-trip.
pub const TRANSFER_TARGET_MS: u64 = 30_000;

static FILES_CHANGED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) files? changed").expect("valid regex"));

/// Number from git's "N files changed" summary line, 0 when absent.
pub fn parse_files_changed(output: &str) -> u64 {
    FILES_CHANGED
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// How long past the clone timeout a lock file is still honoured.
const LOCK_GRACE: Duration = Duration::from_secs(60);

/// Parse `git rev-list --count --left-right` output into (ahead, behind).
pub fn parse_ahead_behind(output: &str) -> Option<(u64, u64)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

impl RepositoryCache {
    // -----------------------------------------------------------------------
    // Clone
    // -----------------------------------------------------------------------

    /// Clone `url` into its cache entry.
    ///
    /// Returns `already_exists` without touching git when the entry already
    /// holds a `.git` directory. A failed or timed-out clone leaves no
    /// partial directory behind.
    pub async fn clone_repository(
        &self,
        url: &str,
        auth_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CloneOutcome> {
        let key = cache_key(url)?;
        let span = cache_span("clone", &key);
        self.clone_inner(url, key, auth_token, timeout.unwrap_or(self.clone_timeout))
            .instrument(span)
            .await
    }

    async fn clone_inner(
        &self,
        url: &str,
        key: String,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> Result<CloneOutcome> {
        let start = Instant::now();
        let path = self.root().join(&key);

        if path.join(".git").is_dir() {
            return Ok(already_cached(path, key, start));
        }

        std::fs::create_dir_all(self.root()).map_err(|e| {
            TaskError::repository(format!(
                "failed to create cache root {}: {e}",
                self.root().display()
            ))
        })?;
        let _lock = EntryLock::acquire(self.root(), &key, timeout + LOCK_GRACE)?;
        if path.join(".git").is_dir() {
            return Ok(already_cached(path, key, start));
        }

        // a leftover directory without .git is an interrupted clone
        if path.exists() {
            warn!(path = %path.display(), "removing stale cache entry before clone");
            std::fs::remove_dir_all(&path).map_err(|e| {
                TaskError::repository(format!(
                    "failed to clear stale cache entry {}: {e}",
                    path.display()
                ))
            })?;
        }

        let auth_url = authenticated_url(url, auth_token)?;
        let target = path.to_string_lossy().to_string();
        info!(path = %target, status = %ExecutionStatus::Started, "cloning repository");

        let result = self
            .git(self.root(), &["clone", auth_url.as_str(), target.as_str()], timeout)
            .await;
        match result {
            Ok(out) if out.success => {}
            Ok(out) => {
                remove_partial(&path);
                self.metrics()
                    .record_operation("clone", "failure", elapsed_ms(start));
                return Err(TaskError::repository(format!(
                    "git clone failed (exit {:?}): {}",
                    out.exit_code,
                    redact(out.stderr.trim(), auth_token)
                )));
            }
            Err(e) => {
                remove_partial(&path);
                self.metrics()
                    .record_operation("clone", "failure", elapsed_ms(start));
                return Err(TaskError::repository(redact(e.message(), auth_token)));
            }
        }

        if !is_non_empty_dir(&path) {
            remove_partial(&path);
            return Err(TaskError::repository(format!(
                "clone of {url} produced an empty directory"
            )));
        }
        self.apply_dir_mode(&path)?;

        // keep the token out of .git/config
        if auth_url.as_str() != url {
            match self
                .git(&path, &["remote", "set-url", "origin", url], timeout)
                .await
            {
                Ok(out) if out.success => {}
                Ok(out) => warn!(stderr = %out.stderr.trim(), "failed to reset origin url"),
                Err(e) => warn!(error = %e, "failed to reset origin url"),
            }
        }

        let duration_ms = elapsed_ms(start);
        let files_cloned = tree_stats(&path, true).file_count;
        let size = tree_stats(&path, false).size_bytes;
        self.metrics().record_operation("clone", "success", duration_ms);
        info!(
            path = %path.display(),
            files_cloned,
            size_bytes = size,
            duration_ms,
            status = %ExecutionStatus::Completed,
            "repository cloned"
        );

        Ok(CloneOutcome {
            success: true,
            cache_path: path,
            cache_key: key,
            clone_status: CloneStatus::Cloned,
            repository_size_bytes: size,
            files_cloned,
            performance_metrics: PerformanceMetrics::new(duration_ms, TRANSFER_TARGET_MS),
        })
    }

    // -----------------------------------------------------------------------
    // Fetch
    // -----------------------------------------------------------------------

    /// Fetch from origin and fast-forward the working copy when it is behind.
    pub async fn fetch_latest_changes(
        &self,
        url: &str,
        auth_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<FetchOutcome> {
        let key = cache_key(url)?;
        let span = cache_span("fetch", &key);
        self.fetch_inner(url, key, auth_token, timeout.unwrap_or(self.fetch_timeout))
            .instrument(span)
            .await
    }

    async fn fetch_inner(
        &self,
        url: &str,
        key: String,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchOutcome> {
        let start = Instant::now();
        let path = self.root().join(&key);

        if !path.join(".git").is_dir() {
            info!(path = %path.display(), "no cached repository to fetch");
            return Ok(FetchOutcome {
                success: false,
                cache_path: path,
                fetch_status: FetchStatus::NotFound,
                changes_fetched: false,
                commits_ahead: 0,
                commits_behind: 0,
                files_changed: 0,
                repository_size_bytes: 0,
                performance_metrics: PerformanceMetrics::new(elapsed_ms(start), TRANSFER_TARGET_MS),
            });
        }

        let parsed = validate_repository_url(url)?;
        let use_token = auth_token.is_some_and(|t| !t.is_empty())
            && TOKEN_SCHEMES.contains(&parsed.scheme());
        let auth_url = authenticated_url(url, auth_token)?;

        let fetch_args: Vec<&str> = if use_token {
            vec![
                "fetch",
                auth_url.as_str(),
                "+refs/heads/*:refs/remotes/origin/*",
            ]
        } else {
            vec!["fetch", "origin"]
        };
        let fetched = self.git(&path, &fetch_args, timeout).await.map_err(|e| {
            TaskError::repository(redact(e.message(), auth_token))
        })?;
        if !fetched.success {
            self.metrics()
                .record_operation("fetch", "failure", elapsed_ms(start));
            return Err(TaskError::repository(format!(
                "git fetch failed (exit {:?}): {}",
                fetched.exit_code,
                redact(fetched.stderr.trim(), auth_token)
            )));
        }
        // git reports ref updates as "old..new  branch -> origin/branch" on stderr
        let refs_updated = fetched.combined().contains("->");

        let (commits_ahead, commits_behind) = self.ahead_behind(&path, timeout).await;

        let mut files_changed = 0;
        let fetch_status = if commits_behind > 0 {
            let pull_args: Vec<&str> = if use_token {
                vec!["pull", auth_url.as_str(), "HEAD"]
            } else {
                vec!["pull", "origin", "HEAD"]
            };
            let pulled = self.git(&path, &pull_args, timeout).await.map_err(|e| {
                TaskError::repository(redact(e.message(), auth_token))
            })?;
            if !pulled.success {
                self.metrics()
                    .record_operation("fetch", "failure", elapsed_ms(start));
                return Err(TaskError::repository(format!(
                    "git pull failed (exit {:?}): {}",
                    pulled.exit_code,
                    redact(pulled.stderr.trim(), auth_token)
                )));
            }
            files_changed = parse_files_changed(&pulled.stdout);
            FetchStatus::Updated
        } else if refs_updated {
            FetchStatus::UpToDate
        } else {
            FetchStatus::NoChanges
        };

        let duration_ms = elapsed_ms(start);
        self.metrics().record_operation("fetch", "success", duration_ms);
        info!(
            path = %path.display(),
            ?fetch_status,
            commits_ahead,
            commits_behind,
            files_changed,
            duration_ms,
            status = %ExecutionStatus::Completed,
            "fetch finished"
        );

        Ok(FetchOutcome {
            success: true,
            changes_fetched: fetch_status == FetchStatus::Updated,
            repository_size_bytes: tree_stats(&path, false).size_bytes,
            cache_path: path,
            fetch_status,
            commits_ahead,
            commits_behind,
            files_changed,
            performance_metrics: PerformanceMetrics::new(duration_ms, TRANSFER_TARGET_MS),
        })
    }

    /// Commits ahead of / behind `origin/HEAD`. Unknown counts read as zero.
    pub(crate) async fn ahead_behind(&self, path: &Path, timeout: Duration) -> (u64, u64) {
        let args = ["rev-list", "--count", "--left-right", "HEAD...origin/HEAD"];
        match self.git(path, &args, timeout).await {
            Ok(out) if out.success => parse_ahead_behind(&out.stdout).unwrap_or((0, 0)),
            Ok(out) => {
                warn!(stderr = %out.stderr.trim(), "cannot compare HEAD with origin/HEAD");
                (0, 0)
            }
            Err(e) => {
                warn!(error = %e, "cannot compare HEAD with origin/HEAD");
                (0, 0)
            }
        }
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "failed to remove partial clone");
        }
    }
}

fn already_cached(path: PathBuf, key: String, start: Instant) -> CloneOutcome {
    let duration_ms = elapsed_ms(start);
    info!(
        path = %path.display(),
        status = %ExecutionStatus::Skipped,
        "repository already cached"
    );
    CloneOutcome {
        success: true,
        repository_size_bytes: tree_stats(&path, false).size_bytes,
        files_cloned: tree_stats(&path, true).file_count,
        cache_path: path,
        cache_key: key,
        clone_status: CloneStatus::AlreadyExists,
        performance_metrics: PerformanceMetrics::new(duration_ms, TRANSFER_TARGET_MS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_changed_summary() {
        assert_eq!(
            parse_files_changed(" 3 files changed, 10 insertions(+), 2 deletions(-)"),
            3
        );
        assert_eq!(parse_files_changed(" 1 file changed, 1 insertion(+)"), 1);
        assert_eq!(parse_files_changed("Already up to date."), 0);
    }

    #[test]
    fn ahead_behind_counts() {
        assert_eq!(parse_ahead_behind("2\t5\n"), Some((2, 5)));
        assert_eq!(parse_ahead_behind("0\t0"), Some((0, 0)));
        assert_eq!(parse_ahead_behind("garbage"), None);
    }
}
