use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum GitRunError {
    /// The git binary could not be started.
    #[error("failed to spawn git: {0}")]
    Spawn(String),
    /// The process did not exit before the deadline and was killed.
    #[error("git {command} timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
}

// ---------------------------------------------------------------------------
// GitOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl GitOutput {
    /// A successful output carrying `stdout` (handy for scripted runners).
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// stdout followed by stderr, for phrase scanning.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

// ---------------------------------------------------------------------------
// GitRunner trait (for testability)
// ---------------------------------------------------------------------------

/// Abstraction over git CLI invocations so they can be mocked in tests.
///
/// Every call carries a hard deadline; a process that outlives it is killed
/// and reported as [`GitRunError::Timeout`].
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run_git(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<GitOutput, GitRunError>;
}

/// Real runner that shells out to the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct ShellGitRunner;

#[async_trait]
impl GitRunner for ShellGitRunner {
    async fn run_git(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<GitOutput, GitRunError> {
        let start = Instant::now();
        let child = tokio::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            // never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(GitRunError::Spawn(e.to_string())),
            Err(_) => {
                return Err(GitRunError::Timeout {
                    command: args.first().copied().unwrap_or("").to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        };

        Ok(GitOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Returns true when a `git` binary can be executed on this host.
pub async fn git_available() -> bool {
    tokio::process::Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_streams() {
        let out = GitOutput {
            stdout: "a".into(),
            stderr: "b".into(),
            ..GitOutput::default()
        };
        assert_eq!(out.combined(), "a\nb");
        assert_eq!(GitOutput::ok("x").combined(), "x");
    }

    #[tokio::test]
    async fn shell_runner_reports_version() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = ShellGitRunner
            .run_git(dir.path(), &["--version"], Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.exit_code, Some(0));
        assert!(out.stdout.starts_with("git version"));
    }

    #[tokio::test]
    async fn shell_runner_nonzero_exit_is_not_an_error() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = ShellGitRunner
            .run_git(dir.path(), &["status"], Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.exit_code.unwrap_or(0) != 0);
    }
}
