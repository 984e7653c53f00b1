//! URL validation, cache-key derivation and credential handling.

use ring::digest::{digest, SHA256};
use tf_core::error::{Result, TaskError};
use url::Url;
use zeroize::Zeroizing;

/// URL schemes accepted for cached repositories.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https", "git", "ssh"];
/// Schemes that accept a token in the authority section.
pub const TOKEN_SCHEMES: &[&str] = &["http", "https"];
/// Maximum length of the sanitized repository name inside a cache key.
pub const MAX_NAME_LEN: usize = 50;
/// Hex characters of the URL digest appended to a cache key.
pub const HASH_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a repository URL and return it parsed.
///
/// Rejects `..` and control characters anywhere in the raw string, then
/// requires one of [`ALLOWED_SCHEMES`] and a host.
pub fn validate_repository_url(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(TaskError::repository("repository url is empty"));
    }
    if raw.contains("..") {
        return Err(TaskError::repository(format!(
            "repository url contains path traversal: {raw:?}"
        )));
    }
    if raw.chars().any(char::is_control) {
        return Err(TaskError::repository(
            "repository url contains control characters",
        ));
    }

    let url = Url::parse(raw)
        .map_err(|e| TaskError::repository(format!("invalid repository url {raw:?}: {e}")))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(TaskError::repository(format!(
            "unsupported url scheme {:?} (allowed: {})",
            url.scheme(),
            ALLOWED_SCHEMES.join(", ")
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(TaskError::repository(format!(
            "repository url has no host: {raw:?}"
        )));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// Derive the cache key for a URL:
/// `sanitize(repo-name)[:50] + "_" + sha256(url)[:12]`.
///
/// Pure and deterministic; the digest covers the full URL string so URLs
/// that share a repository name still get distinct keys.
pub fn cache_key(raw: &str) -> Result<String> {
    let url = validate_repository_url(raw)?;
    let name = sanitize_name(&repo_name(&url));
    let truncated: String = name.chars().take(MAX_NAME_LEN).collect();
    Ok(format!("{truncated}_{}", url_digest(raw)))
}

/// First [`HASH_LEN`] hex characters of SHA-256(url).
pub fn url_digest(raw: &str) -> String {
    let d = digest(&SHA256, raw.as_bytes());
    let mut hex = hex::encode(d.as_ref());
    hex.truncate(HASH_LEN);
    hex
}

/// Last non-empty path segment without a `.git` suffix, falling back to the
/// host for URLs with an empty path.
pub fn repo_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.strip_suffix(".git").unwrap_or(s).to_string())
        .filter(|s| !s.is_empty());

    segment.unwrap_or_else(|| url.host_str().unwrap_or("repo").to_string())
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Build the URL handed to `git`, with `token` injected as the userinfo of
/// http/https URLs. Other schemes pass through unmodified. The returned
/// string is zeroed on drop.
pub fn authenticated_url(raw: &str, token: Option<&str>) -> Result<Zeroizing<String>> {
    let mut url = validate_repository_url(raw)?;
    let token = match token.filter(|t| !t.is_empty()) {
        Some(t) if TOKEN_SCHEMES.contains(&url.scheme()) => t,
        _ => return Ok(Zeroizing::new(raw.to_string())),
    };

    url.set_username(token)
        .and_then(|_| url.set_password(None))
        .map_err(|_| TaskError::repository("cannot attach credentials to repository url"))?;
    Ok(Zeroizing::new(url.to_string()))
}

/// Remove any occurrence of `token` from text that may be logged or returned.
pub fn redact(text: &str, token: Option<&str>) -> String {
    match token.filter(|t| !t.is_empty()) {
        Some(t) => text.replace(t, "***"),
        None => text.to_string(),
    }
}

/// Canonical form used to compare a configured remote with an expected URL:
/// credentials stripped, lower-cased, trailing slash removed.
pub fn normalize_remote_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let normalized = match Url::parse(trimmed) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    };
    normalized.trim_end_matches('/').to_lowercase()
}

mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0x0f) as usize] as char);
        }
        s
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
