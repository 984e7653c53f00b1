use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use tf_core::error::Result;
use tf_telemetry::status::elapsed_ms;
use tf_telemetry::tracing_setup::cache_span;
use tracing::{debug, info, Instrument};

use crate::engine::{git_layout_valid, RepositoryCache};
use crate::fs_stats::{sample_files, to_utc};
use crate::keys::{cache_key, normalize_remote_url};
use crate::types::{
    CloneChecks, CloneValidation, FetchChecks, FetchValidation, FetchValidationInfo,
    PerformanceMetrics, ValidationStatus, METADATA_TARGET_MS,
};

/// Number of working-tree files whose permissions are sampled.
const PERMISSION_SAMPLE: usize = 10;

impl RepositoryCache {
    /// Inspect the cached clone of `url` without modifying it.
    pub async fn validate_clone(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<CloneValidation> {
        let key = cache_key(url)?;
        let timeout = timeout.unwrap_or(self.validate_timeout);
        async {
            let start = Instant::now();
            let path = self.root().join(&key);
            let mut errors = Vec::new();
            let mut warnings = Vec::new();

            if !path.is_dir() {
                return Ok(CloneValidation {
                    is_valid: false,
                    validation_status: ValidationStatus::NotFound,
                    cache_path: path,
                    validation_checks: CloneChecks::default(),
                    errors: vec!["repository is not cached".to_string()],
                    warnings,
                    performance_metrics: PerformanceMetrics::new(
                        elapsed_ms(start),
                        METADATA_TARGET_MS,
                    ),
                });
            }

            let checks = self
                .run_clone_checks(&path, url, timeout, &mut errors, &mut warnings)
                .await;
            let is_valid = checks.required_pass();
            let validation_status = if is_valid {
                ValidationStatus::Valid
            } else {
                ValidationStatus::Invalid
            };

            let duration_ms = elapsed_ms(start);
            info!(path = %path.display(), ?validation_status, duration_ms, "clone validated");
            Ok(CloneValidation {
                is_valid,
                validation_status,
                cache_path: path,
                validation_checks: checks,
                errors,
                warnings,
                performance_metrics: PerformanceMetrics::new(duration_ms, METADATA_TARGET_MS),
            })
        }
        .instrument(cache_span("validate_clone", &key))
        .await
    }

    /// [`validate_clone`](Self::validate_clone) plus synchronisation and
    /// working-tree cleanliness. `valid_with_warnings` means the required
    /// checks pass but at least one soft check does not.
    pub async fn validate_fetch_operation(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<FetchValidation> {
        let key = cache_key(url)?;
        let timeout = timeout.unwrap_or(self.validate_timeout);
        async {
            let start = Instant::now();
            let path = self.root().join(&key);
            let mut errors = Vec::new();
            let mut warnings = Vec::new();

            if !path.join(".git").is_dir() {
                return Ok(FetchValidation {
                    is_valid: false,
                    validation_status: ValidationStatus::NotFound,
                    cache_path: path,
                    validation_checks: CloneChecks::default(),
                    fetch_checks: FetchChecks::default(),
                    fetch_validation: None,
                    errors: vec!["repository is not cached".to_string()],
                    warnings,
                    performance_metrics: PerformanceMetrics::new(
                        elapsed_ms(start),
                        METADATA_TARGET_MS,
                    ),
                });
            }

            let checks = self
                .run_clone_checks(&path, url, timeout, &mut errors, &mut warnings)
                .await;

            let (commits_ahead, commits_behind) = self.ahead_behind(&path, timeout).await;
            let synchronized = commits_behind == 0;
            if !synchronized {
                warnings.push(format!("{commits_behind} commits behind origin"));
            }

            let clean = match self.git(&path, &["status", "--porcelain"], timeout).await {
                Ok(out) if out.success => out.stdout.trim().is_empty(),
                _ => false,
            };
            if !clean {
                warnings.push("working directory has uncommitted changes".to_string());
            }

            let fetch_checks = FetchChecks {
                repository_synchronized: synchronized,
                working_directory_clean: clean,
            };
            let info = fetch_head_info(&path, commits_ahead, commits_behind);

            let soft_ok = synchronized
                && clean
                && checks.repository_not_corrupted
                && checks.proper_permissions;
            let validation_status = match (checks.required_pass(), soft_ok) {
                (true, true) => ValidationStatus::Valid,
                (true, false) => ValidationStatus::ValidWithWarnings,
                (false, _) => ValidationStatus::Invalid,
            };

            let duration_ms = elapsed_ms(start);
            info!(
                path = %path.display(),
                ?validation_status,
                commits_ahead,
                commits_behind,
                duration_ms,
                "fetch validated"
            );
            Ok(FetchValidation {
                is_valid: checks.required_pass(),
                validation_status,
                cache_path: path,
                validation_checks: checks,
                fetch_checks,
                fetch_validation: Some(info),
                errors,
                warnings,
                performance_metrics: PerformanceMetrics::new(duration_ms, METADATA_TARGET_MS),
            })
        }
        .instrument(cache_span("validate_fetch", &key))
        .await
    }

    async fn run_clone_checks(
        &self,
        path: &Path,
        url: &str,
        timeout: Duration,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> CloneChecks {
        let mut checks = CloneChecks {
            git_directory_exists: path.join(".git").is_dir(),
            ..CloneChecks::default()
        };
        if !checks.git_directory_exists {
            errors.push("missing .git directory".to_string());
            return checks;
        }

        checks.git_status_works = match self.git(path, &["status", "--porcelain"], timeout).await {
            Ok(out) => out.success,
            Err(e) => {
                debug!(error = %e, "git status failed");
                false
            }
        };
        if !checks.git_status_works {
            errors.push("git status failed".to_string());
        }

        checks.remote_origin_configured =
            match self.git(path, &["remote", "get-url", "origin"], timeout).await {
                Ok(out) if out.success => {
                    normalize_remote_url(&out.stdout) == normalize_remote_url(url)
                }
                _ => false,
            };
        if !checks.remote_origin_configured {
            errors.push("origin remote missing or does not match the repository url".to_string());
        }

        checks.repository_not_corrupted =
            match self.git(path, &["fsck", "--no-progress"], timeout).await {
                Ok(out) => out.success,
                Err(_) => false,
            };
        if !checks.repository_not_corrupted {
            warnings.push("git fsck reported problems".to_string());
        }

        checks.proper_permissions = permissions_ok(path);
        if !checks.proper_permissions {
            warnings.push("cache entry is not readable and writable by its owner".to_string());
        }

        checks.directory_structure_valid = git_layout_valid(path);
        if !checks.directory_structure_valid {
            errors.push(".git is missing HEAD, objects or refs".to_string());
        }

        checks
    }
}

#[cfg(unix)]
fn permissions_ok(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let mode = |p: &Path| std::fs::metadata(p).map(|m| m.permissions().mode()).ok();
    let dir_ok = mode(path).is_some_and(|m| m & 0o600 == 0o600);
    dir_ok
        && sample_files(path, PERMISSION_SAMPLE)
            .iter()
            .all(|f| mode(f).is_some_and(|m| m & 0o400 != 0))
}

#[cfg(not(unix))]
fn permissions_ok(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| !m.permissions().readonly())
        && sample_files(path, PERMISSION_SAMPLE)
            .iter()
            .all(|f| std::fs::metadata(f).is_ok())
}

fn fetch_head_info(path: &Path, commits_ahead: u64, commits_behind: u64) -> FetchValidationInfo {
    let fetch_head = path.join(".git").join("FETCH_HEAD");
    let last_fetch_at = std::fs::metadata(&fetch_head)
        .ok()
        .and_then(|m| to_utc(m.modified()));
    let minutes = last_fetch_at.map(|t| (Utc::now() - t).num_minutes());
    FetchValidationInfo {
        fetch_head_exists: fetch_head.is_file(),
        last_fetch_at,
        minutes_since_last_fetch: minutes,
        fetched_within_24h: minutes.is_some_and(|m| m < 24 * 60),
        commits_ahead,
        commits_behind,
    }
}
