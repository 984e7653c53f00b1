use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Latency target for metadata-only cache operations.
pub const METADATA_TARGET_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub duration_ms: u64,
    pub target_ms: u64,
    pub within_target: bool,
}

impl PerformanceMetrics {
    pub fn new(duration_ms: u64, target_ms: u64) -> Self {
        Self {
            duration_ms,
            target_ms,
            within_target: duration_ms <= target_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLookupStatus {
    CacheHit,
    CacheMiss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCheck {
    pub exists_in_cache: bool,
    pub cache_path: PathBuf,
    pub cache_key: String,
    pub validation_status: CacheLookupStatus,
    pub size_bytes: Option<u64>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub performance_metrics: PerformanceMetrics,
}

/// Detailed metadata for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    pub cache_key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub file_count: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub changed_at: Option<DateTime<Utc>>,
    pub is_git_repository: bool,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub cache_root: PathBuf,
    pub root_exists: bool,
    pub total_directories: u64,
    pub git_repositories: u64,
    pub total_size_bytes: u64,
    pub total_files: u64,
    pub oldest_modified_at: Option<DateTime<Utc>>,
    pub newest_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub directories_checked: u64,
    pub directories_removed: u64,
    pub bytes_freed: u64,
    pub errors: u64,
    pub error_details: Vec<String>,
}

// ---------------------------------------------------------------------------
// Clone / fetch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneStatus {
    Cloned,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOutcome {
    pub success: bool,
    pub cache_path: PathBuf,
    pub cache_key: String,
    pub clone_status: CloneStatus,
    pub repository_size_bytes: u64,
    pub files_cloned: u64,
    pub performance_metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    NotFound,
    Updated,
    UpToDate,
    NoChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub success: bool,
    pub cache_path: PathBuf,
    pub fetch_status: FetchStatus,
    pub changes_fetched: bool,
    pub commits_ahead: u64,
    pub commits_behind: u64,
    /// Parsed from git's "N files changed" summary; a heuristic, not a count
    /// git guarantees to print in this form.
    pub files_changed: u64,
    pub repository_size_bytes: u64,
    pub performance_metrics: PerformanceMetrics,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    NotFound,
    Valid,
    ValidWithWarnings,
    Invalid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneChecks {
    pub git_directory_exists: bool,
    pub git_status_works: bool,
    pub remote_origin_configured: bool,
    pub repository_not_corrupted: bool,
    pub proper_permissions: bool,
    pub directory_structure_valid: bool,
}

impl CloneChecks {
    /// The checks a usable clone cannot do without.
    pub fn required_pass(&self) -> bool {
        self.git_directory_exists
            && self.git_status_works
            && self.remote_origin_configured
            && self.directory_structure_valid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneValidation {
    pub is_valid: bool,
    pub validation_status: ValidationStatus,
    pub cache_path: PathBuf,
    pub validation_checks: CloneChecks,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub performance_metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchChecks {
    pub repository_synchronized: bool,
    pub working_directory_clean: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchValidationInfo {
    pub fetch_head_exists: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub minutes_since_last_fetch: Option<i64>,
    pub fetched_within_24h: bool,
    pub commits_ahead: u64,
    pub commits_behind: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchValidation {
    pub is_valid: bool,
    pub validation_status: ValidationStatus,
    pub cache_path: PathBuf,
    pub validation_checks: CloneChecks,
    pub fetch_checks: FetchChecks,
    pub fetch_validation: Option<FetchValidationInfo>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub performance_metrics: PerformanceMetrics,
}
