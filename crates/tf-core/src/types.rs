use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_MODEL: &str = "sonnet";
pub const DEFAULT_BRANCH: &str = "main";

/// Everything the orchestrator needs to run one stage for one execution.
///
/// Built by the caller per call and never mutated by the orchestrator.
/// Validated with [`crate::validation::validate_context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub project_id: String,
    pub execution_id: String,
    pub correlation_id: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub repository_path: Option<String>,
    #[serde(default)]
    pub repository_branch: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    #[serde(default)]
    pub tool_args: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl ExecutionContext {
    pub fn new(project_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            execution_id: execution_id.into(),
            correlation_id: uuid::Uuid::new_v4().simple().to_string(),
            repository_url: None,
            repository_path: None,
            repository_branch: None,
            model: default_model(),
            files_to_modify: Vec::new(),
            tool_args: Vec::new(),
            timeout_seconds: default_timeout(),
            working_directory: None,
            user_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_repository(mut self, url: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self.repository_branch = Some(branch.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn branch(&self) -> &str {
        self.repository_branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }
}

// ---------------------------------------------------------------------------
// Retry bookkeeping
// ---------------------------------------------------------------------------

/// One try of a bounded-retry operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttemptRecord {
    pub attempt: u32,
    pub start_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error_type: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
    pub container_id: Option<String>,
}

/// Millisecond timings for each phase of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDurations {
    pub setup_ms: u64,
    pub execution_ms: u64,
    pub artifact_capture_ms: u64,
    pub total_ms: u64,
}

// ---------------------------------------------------------------------------
// Git outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMergeOutcome {
    pub source_branch: String,
    pub target_branch: String,
    pub has_conflicts: bool,
    pub conflicting_files: Vec<String>,
    pub commit_hash: Option<String>,
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitPushOutcome {
    pub branch: String,
    pub remote: String,
    pub push_rejected: bool,
    pub commit_hash: Option<String>,
    pub files_pushed: Vec<String>,
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Structured outcome of one orchestrator call. Built once per call; for
/// retried operations it carries every attempt that led up to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub project_id: String,
    pub execution_id: String,
    pub correlation_id: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub diff_output: Option<String>,
    pub files_modified: Vec<String>,
    pub commit_hash: Option<String>,
    pub tool_version: Option<String>,
    pub durations: PhaseDurations,
    pub attempt_count: u32,
    pub retry_attempts: Vec<RetryAttemptRecord>,
    pub final_attempt: u32,
    pub container_id: Option<String>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub merge: Option<GitMergeOutcome>,
    pub push: Option<GitPushOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// An empty single-attempt result for the given context.
    pub fn for_context(ctx: &ExecutionContext) -> Self {
        Self {
            project_id: ctx.project_id.clone(),
            execution_id: ctx.execution_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            diff_output: None,
            files_modified: Vec::new(),
            commit_hash: None,
            tool_version: None,
            durations: PhaseDurations::default(),
            attempt_count: 1,
            retry_attempts: Vec::new(),
            final_attempt: 1,
            container_id: None,
            skipped: false,
            skip_reason: None,
            merge: None,
            push: None,
            timestamp: Utc::now(),
        }
    }

    /// A successful no-op result for repositories that lack the manifest or
    /// script an operation needs.
    pub fn skipped(ctx: &ExecutionContext, reason: impl Into<String>) -> Self {
        let mut result = Self::for_context(ctx);
        result.success = true;
        result.exit_code = 0;
        result.skipped = true;
        result.skip_reason = Some(reason.into());
        result
    }

    /// Replace `files_modified` with the sorted, deduplicated union of `files`.
    pub fn set_files<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = files.into_iter().map(Into::into).collect();
        self.files_modified = set.into_iter().collect();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_defaults() {
        let ctx = ExecutionContext::new("proj", "exec");
        assert_eq!(ctx.model, DEFAULT_MODEL);
        assert_eq!(ctx.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(ctx.branch(), "main");
        assert_eq!(ctx.correlation_id.len(), 32);
    }

    #[test]
    fn context_deserializes_with_defaults() {
        let ctx: ExecutionContext = serde_json::from_str(
            r#"{"project_id":"p","execution_id":"e","correlation_id":"c"}"#,
        )
        .unwrap();
        assert_eq!(ctx.model, "sonnet");
        assert!(ctx.files_to_modify.is_empty());
    }

    #[test]
    fn set_files_deduplicates() {
        let ctx = ExecutionContext::new("p", "e");
        let mut result = ExecutionResult::for_context(&ctx);
        result.set_files(["b.rs", "a.rs", "b.rs"]);
        assert_eq!(result.files_modified, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn skipped_result_is_success() {
        let ctx = ExecutionContext::new("p", "e");
        let result = ExecutionResult::skipped(&ctx, "no_package_json");
        assert!(result.success);
        assert!(result.skipped);
        assert_eq!(result.exit_code, 0);
        assert!(result.files_modified.is_empty());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["skip_reason"], "no_package_json");
    }
}
