use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_core::error::{Result, TaskError};
use tracing::debug;

// ---------------------------------------------------------------------------
// Exec output
// ---------------------------------------------------------------------------

/// Exit code and merged stdout/stderr of one command run in a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ExecOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A running container that accepts shell commands.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    /// Run `cmd` through a shell. A non-zero exit is reported in the output,
    /// not as an error; errors mean the command could not be delivered.
    async fn exec(&self, cmd: &str) -> Result<ExecOutput>;
}

/// Result of [`ContainerManager::start_or_reuse`].
#[derive(Clone)]
pub struct ContainerSession {
    pub container_id: String,
    /// "created", "started" or "reused".
    pub status: String,
    pub handle: Arc<dyn ContainerHandle>,
}

impl std::fmt::Debug for ContainerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSession")
            .field("container_id", &self.container_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub checked: u64,
    pub removed: u64,
    pub errors: u64,
}

/// Provisions one isolated environment per (project, execution).
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// Return the execution's container, creating or starting it as needed.
    /// Failures are [`TaskError::Container`].
    async fn start_or_reuse(
        &self,
        project_id: &str,
        execution_id: &str,
        timeout: Duration,
    ) -> Result<ContainerSession>;

    /// Remove managed containers older than `max_age_days` (zero removes
    /// all). With an `execution_id`, only that execution's containers are
    /// considered and its workspace is kept, so a retry resumes from the
    /// same checkout. A sweep without an id also drops the workspaces of
    /// the containers it removes.
    async fn cleanup_expired(
        &self,
        max_age_days: u64,
        execution_id: Option<&str>,
    ) -> Result<CleanupStats>;
}

// ---------------------------------------------------------------------------
// Command helpers
// ---------------------------------------------------------------------------

/// Prefix `cmd` with a `cd` into `dir`.
pub fn in_dir(dir: &str, cmd: &str) -> String {
    format!("cd {} && {cmd}", shell_words::quote(dir))
}

/// Run `cmd`, turning a non-zero exit into [`TaskError::Execution`].
pub async fn exec_checked(handle: &dyn ContainerHandle, cmd: &str) -> Result<String> {
    let out = handle.exec(cmd).await?;
    if out.success() {
        Ok(out.output)
    } else {
        debug!(cmd, exit_code = out.exit_code, "command failed");
        Err(TaskError::execution(
            format!("`{cmd}` exited with {}: {}", out.exit_code, tail(&out.output, 20)),
            Some(out.exit_code),
        ))
    }
}

/// Whether `test <flag> <path>` succeeds in the container.
pub async fn path_test(handle: &dyn ContainerHandle, flag: &str, path: &str) -> Result<bool> {
    let out = handle
        .exec(&format!("test {flag} {}", shell_words::quote(path)))
        .await?;
    Ok(out.success())
}

/// Last `lines` lines of `text`.
pub fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
