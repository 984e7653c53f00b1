//! Input validation shared by every orchestrator entry point.
//!
//! All checks here run before any container or filesystem side effect.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, TaskError};
use crate::types::ExecutionContext;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Project and execution identifiers.
pub const ID_PATTERN: &str = r"^[a-zA-Z0-9_/-]+$";
/// Model names passed to the coding assistant.
pub const MODEL_PATTERN: &str = r"^[a-zA-Z0-9_-]+$";
/// Branch and remote names.
pub const REF_NAME_PATTERN: &str = r"^[a-zA-Z0-9_/-]+(?:\.[a-zA-Z0-9_/-]+)*$";

pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(ID_PATTERN).expect("valid id regex"));
static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MODEL_PATTERN).expect("valid model regex"));
static REF_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REF_NAME_PATTERN).expect("valid ref regex"));

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

pub fn is_valid_id(value: &str) -> bool {
    !value.is_empty() && ID_RE.is_match(value)
}

pub fn is_valid_model(value: &str) -> bool {
    !value.is_empty() && MODEL_RE.is_match(value)
}

pub fn is_valid_ref_name(value: &str) -> bool {
    !value.is_empty() && REF_NAME_RE.is_match(value)
}

/// Validate an [`ExecutionContext`]; failures carry the context identifiers.
pub fn validate_context(ctx: &ExecutionContext) -> Result<()> {
    let fail = |msg: String| Err(TaskError::validation(msg).with_context(&ctx.project_id, &ctx.execution_id));

    if !is_valid_id(&ctx.project_id) {
        return fail(format!("invalid project_id {:?}", ctx.project_id));
    }
    if !is_valid_id(&ctx.execution_id) {
        return fail(format!("invalid execution_id {:?}", ctx.execution_id));
    }
    if !is_valid_model(&ctx.model) {
        return fail(format!("invalid model {:?}", ctx.model));
    }
    if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&ctx.timeout_seconds) {
        return fail(format!(
            "timeout_seconds must be in [{MIN_TIMEOUT_SECONDS}, {MAX_TIMEOUT_SECONDS}], got {}",
            ctx.timeout_seconds
        ));
    }
    if let Some(branch) = &ctx.repository_branch {
        if !is_valid_ref_name(branch) {
            return fail(format!("invalid repository_branch {branch:?}"));
        }
    }
    for file in &ctx.files_to_modify {
        if file.is_empty() || file.contains("..") || file.chars().any(char::is_control) {
            return fail(format!("invalid file path {file:?}"));
        }
    }
    Ok(())
}

/// Validate a single branch or remote name.
pub fn validate_ref_name(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TaskError::validation(format!("{label} must not be empty")));
    }
    if !is_valid_ref_name(value) {
        return Err(TaskError::validation(format!("invalid {label} {value:?}")));
    }
    Ok(())
}

/// Validate a merge's source/target pair: both well-formed and distinct.
pub fn validate_merge_branches(source: &str, target: &str) -> Result<()> {
    validate_ref_name("source branch", source)?;
    validate_ref_name("target branch", target)?;
    if source == target {
        return Err(TaskError::validation(format!(
            "source and target branch are both {source:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn ids_accept_allowed_characters() {
        for id in ["proj", "proj-1", "org/proj_2", "A-Z_a-z/0-9"] {
            assert!(is_valid_id(id), "{id} should be valid");
        }
    }

    #[test]
    fn ids_reject_other_characters() {
        for id in ["", "a b", "<script>", "proj.1", "proj;rm", "ünï"] {
            assert!(!is_valid_id(id), "{id:?} should be invalid");
        }
    }

    #[test]
    fn model_rejects_slash() {
        assert!(is_valid_model("gpt-4o"));
        assert!(!is_valid_model("openai/gpt-4o"));
    }

    #[test]
    fn ref_names() {
        assert!(is_valid_ref_name("main"));
        assert!(is_valid_ref_name("feature/x.y"));
        assert!(is_valid_ref_name("release/1.2.3"));
        assert!(!is_valid_ref_name("a..b"));
        assert!(!is_valid_ref_name(".hidden"));
        assert!(!is_valid_ref_name("trailing."));
        assert!(!is_valid_ref_name("has space"));
    }

    #[test]
    fn context_validation_errors_carry_ids() {
        let mut ctx = ExecutionContext::new("proj", "exec");
        ctx.model = "bad model".into();
        let err = validate_context(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.context().project_id.as_deref(), Some("proj"));
    }

    #[test]
    fn context_timeout_bounds() {
        let mut ctx = ExecutionContext::new("proj", "exec");
        ctx.timeout_seconds = 0;
        assert!(validate_context(&ctx).is_err());
        ctx.timeout_seconds = 3601;
        assert!(validate_context(&ctx).is_err());
        ctx.timeout_seconds = 3600;
        assert!(validate_context(&ctx).is_ok());
    }

    #[test]
    fn context_rejects_traversal_in_files() {
        let mut ctx = ExecutionContext::new("proj", "exec");
        ctx.files_to_modify = vec!["../etc/passwd".into()];
        assert!(validate_context(&ctx).is_err());
    }

    #[test]
    fn merge_branches_must_differ() {
        assert!(validate_merge_branches("feature", "main").is_ok());
        assert!(validate_merge_branches("main", "main").is_err());
        assert!(validate_merge_branches("", "main").is_err());
    }
}
