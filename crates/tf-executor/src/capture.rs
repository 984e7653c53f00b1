//! Best-effort extraction of artifacts from command output.
//!
//! Everything here is a pure function over captured text, except
//! [`try_capture`], which wraps a fallible lookup so it can never fail the
//! surrounding operation.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use tf_core::error::Result;
use tracing::warn;

/// Substrings in `git merge` output that mean the merge stopped on conflicts.
pub const CONFLICT_MARKERS: &[&str] = &[
    "CONFLICT",
    "Automatic merge failed",
    "<<<<<<< HEAD",
    "=======",
    ">>>>>>> ",
    "fix conflicts and then commit",
];

/// Lower-case substrings in `git push` output that mean the remote refused.
pub const REJECTION_PHRASES: &[&str] = &[
    "rejected",
    "non-fast-forward",
    "fetch first",
    "push declined",
    "permission denied",
    "authentication failed",
    "could not read username",
    "error: 403",
    "http 403",
    "403 forbidden",
];

/// Directories a JavaScript build commonly writes to.
pub const BUILD_OUTPUT_DIRS: &[&str] = &["dist", "build", "out", "public", ".next", "lib", "es"];

/// Porcelain status codes for unmerged paths.
pub const CONFLICT_STATUS_CODES: &[&str] = &["UU", "AA", "DD"];

static FILE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)^\s*(?:modified|updated|edited):\s+(\S+)\s*$",
        r"(?im)^\s*(?:created|added|new file):\s+(\S+)\s*$",
        r"(?im)^\s*(?:deleted|removed):\s+(\S+)\s*$",
        r"(?im)^\s*(?:applied edit to|wrote)\s+(\S+)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static COMMIT_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-f]{40}\b").expect("valid regex"));

// ---------------------------------------------------------------------------
// try_capture
// ---------------------------------------------------------------------------

/// Await `lookup`; on error log a warning and return `None`.
pub async fn try_capture<T, F>(name: &str, lookup: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match lookup.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(capture = name, error = %e, "artifact capture failed");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Scrapers
// ---------------------------------------------------------------------------

/// Files reported as modified, created or deleted in tool output.
pub fn extract_file_changes(output: &str) -> BTreeSet<String> {
    FILE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(output))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// First full 40-character commit hash in `output`.
pub fn extract_commit_hash(output: &str) -> Option<String> {
    COMMIT_HASH.find(output).map(|m| m.as_str().to_string())
}

/// True iff `exit_code == 1` or the output contains a conflict marker.
///
/// git also exits with 1 for some non-conflict failures; those are
/// reported as conflicts too.
pub fn detect_merge_conflicts(output: &str, exit_code: i32) -> bool {
    exit_code == 1 || CONFLICT_MARKERS.iter().any(|m| output.contains(m))
}

/// True iff the push failed and the output names a known rejection reason.
pub fn detect_push_rejection(output: &str, exit_code: i32) -> bool {
    if exit_code == 0 {
        return false;
    }
    let lower = output.to_lowercase();
    REJECTION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Unmerged paths from `git status --porcelain` output.
pub fn parse_conflicted_files(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter_map(|line| {
            let code = line.get(..2)?;
            let path = line.get(3..)?.trim();
            (CONFLICT_STATUS_CODES.contains(&code) && !path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

/// Non-empty trimmed lines.
pub fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Known build output directories named in `listing`, with a trailing slash.
pub fn build_output_paths(listing: &str) -> Vec<String> {
    let found: BTreeSet<&str> = listing.lines().map(str::trim).collect();
    BUILD_OUTPUT_DIRS
        .iter()
        .filter(|d| found.contains(*d))
        .map(|d| format!("{d}/"))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
