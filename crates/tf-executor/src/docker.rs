//! [`ContainerManager`] backed by the `docker` CLI.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ring::digest::{digest, SHA256};
use tf_core::config::ContainerConfig;
use tf_core::error::{Result, TaskError};
use tracing::{debug, info, warn};

use crate::container::{CleanupStats, ContainerHandle, ContainerManager, ContainerSession, ExecOutput};

pub const LABEL_PROJECT: &str = "taskforge.project";
pub const LABEL_EXECUTION: &str = "taskforge.execution";
pub const LABEL_CREATED: &str = "taskforge.created";
pub const LABEL_WORKSPACE: &str = "taskforge.workspace";

const CLI_TIMEOUT: Duration = Duration::from_secs(60);

struct CliOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

async fn run_cli(binary: &str, args: &[&str], timeout: Duration) -> Result<CliOutput> {
    let child = tokio::process::Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(TaskError::container(format!("failed to run {binary}: {e}"))),
        Err(_) => {
            return Err(TaskError::container(format!(
                "{binary} {} timed out after {}s",
                args.first().copied().unwrap_or(""),
                timeout.as_secs()
            )))
        }
    };
    Ok(CliOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// `{prefix}-{project}-{execution}-{digest}` with every character docker
/// would reject replaced by `-`. The digest covers the raw ids, so pairs
/// that sanitise to the same text still get distinct names.
pub fn container_name(prefix: &str, project_id: &str, execution_id: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    };
    format!(
        "{}-{}-{}-{}",
        clean(prefix),
        clean(project_id),
        clean(execution_id),
        identity_digest(project_id, execution_id)
    )
}

/// First 8 hex characters of SHA-256(project NUL execution).
fn identity_digest(project_id: &str, execution_id: &str) -> String {
    let d = digest(&SHA256, format!("{project_id}\0{execution_id}").as_bytes());
    d.as_ref()[..4].iter().map(|b| format!("{b:02x}")).collect()
}

/// Named volume holding an execution's workspace. It outlives the container
/// so a retry that replaces the container still sees the checkout.
pub fn workspace_volume(container: &str) -> String {
    format!("{container}-workspace")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListedContainer {
    id: String,
    created: i64,
    workspace: Option<String>,
}

/// Parse `ps --format '{{.ID}}\t{{created label}}\t{{workspace label}}'`.
/// A missing or malformed creation label reads as the epoch.
fn parse_listing(stdout: &str) -> Vec<ListedContainer> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let mut fields = line.split('\t');
            let id = fields.next().unwrap_or_default().trim().to_string();
            let created = fields
                .next()
                .and_then(|c| c.trim().parse::<i64>().ok())
                .unwrap_or(0);
            let workspace = fields
                .next()
                .map(str::trim)
                .filter(|w| !w.is_empty() && *w != "<no value>")
                .map(str::to_string);
            ListedContainer {
                id,
                created,
                workspace,
            }
        })
        .collect()
}

/// Whether a container created at `created` (unix seconds) is past
/// `max_age_days`. Zero days expires everything.
fn is_expired(created: i64, max_age_days: u64, now: i64) -> bool {
    if max_age_days == 0 {
        return true;
    }
    let max_age = i64::try_from(max_age_days)
        .unwrap_or(i64::MAX)
        .saturating_mul(86_400);
    created <= now.saturating_sub(max_age)
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub struct DockerHandle {
    runtime: String,
    container_id: String,
    workdir: String,
    exec_timeout: Duration,
}

#[async_trait]
impl ContainerHandle for DockerHandle {
    async fn exec(&self, cmd: &str) -> Result<ExecOutput> {
        debug!(container_id = %self.container_id, cmd, "docker exec");
        let out = run_cli(
            &self.runtime,
            &["exec", "-w", &self.workdir, &self.container_id, "sh", "-lc", cmd],
            self.exec_timeout,
        )
        .await?;
        let output = if out.stderr.is_empty() {
            out.stdout
        } else if out.stdout.is_empty() {
            out.stderr
        } else {
            format!("{}\n{}", out.stdout, out.stderr)
        };
        Ok(ExecOutput::new(out.exit_code, output))
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct DockerContainerManager {
    runtime: String,
    image: String,
    name_prefix: String,
    workdir: String,
    exec_timeout: Duration,
}

impl DockerContainerManager {
    pub fn new(cfg: &ContainerConfig, workdir: impl Into<String>) -> Self {
        Self {
            runtime: cfg.runtime.clone(),
            image: cfg.image.clone(),
            name_prefix: cfg.name_prefix.clone(),
            workdir: workdir.into(),
            exec_timeout: Duration::from_secs(3600),
        }
    }

    /// Upper bound for a single `exec`.
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    fn session(&self, container_id: String, status: &str) -> ContainerSession {
        ContainerSession {
            handle: Arc::new(DockerHandle {
                runtime: self.runtime.clone(),
                container_id: container_id.clone(),
                workdir: self.workdir.clone(),
                exec_timeout: self.exec_timeout,
            }),
            container_id,
            status: status.to_string(),
        }
    }

    /// Run a removal command, logging failures. Returns whether it worked.
    async fn remove(&self, args: &[&str]) -> bool {
        match run_cli(&self.runtime, args, CLI_TIMEOUT).await {
            Ok(out) if out.exit_code == 0 => true,
            Ok(out) => {
                warn!(args = ?args, stderr = %out.stderr.trim(), "docker removal failed");
                false
            }
            Err(e) => {
                warn!(args = ?args, error = %e, "docker removal failed");
                false
            }
        }
    }

    /// Arguments for `docker run`: a detached idle container with the
    /// execution's workspace volume mounted at the working directory.
    fn run_args(&self, name: &str, project_id: &str, execution_id: &str, created: i64) -> Vec<String> {
        let volume = workspace_volume(name);
        vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.into(),
            "--label".into(),
            format!("{LABEL_PROJECT}={project_id}"),
            "--label".into(),
            format!("{LABEL_EXECUTION}={execution_id}"),
            "--label".into(),
            format!("{LABEL_CREATED}={created}"),
            "--label".into(),
            format!("{LABEL_WORKSPACE}={volume}"),
            "-v".into(),
            format!("{volume}:{}", self.workdir),
            "-w".into(),
            self.workdir.clone(),
            self.image.clone(),
            "sleep".into(),
            "infinity".into(),
        ]
    }

    async fn provision(&self, project_id: &str, execution_id: &str) -> Result<ContainerSession> {
        let name = container_name(&self.name_prefix, project_id, execution_id);

        let inspect = run_cli(
            &self.runtime,
            &["inspect", "-f", "{{.State.Running}}", &name],
            CLI_TIMEOUT,
        )
        .await?;
        if inspect.exit_code == 0 {
            if inspect.stdout.trim() == "true" {
                debug!(container = %name, "reusing running container");
                return Ok(self.session(name, "reused"));
            }
            let started = run_cli(&self.runtime, &["start", &name], CLI_TIMEOUT).await?;
            if started.exit_code != 0 {
                return Err(TaskError::container(format!(
                    "failed to start container {name}: {}",
                    started.stderr.trim()
                )));
            }
            info!(container = %name, "started stopped container");
            return Ok(self.session(name, "started"));
        }

        let args = self.run_args(&name, project_id, execution_id, Utc::now().timestamp());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let run = run_cli(&self.runtime, &args, CLI_TIMEOUT).await?;
        if run.exit_code != 0 {
            return Err(TaskError::container(format!(
                "failed to create container {name}: {}",
                run.stderr.trim()
            )));
        }
        info!(container = %name, image = %self.image, volume = %workspace_volume(&name), "created container");
        Ok(self.session(name, "created"))
    }
}

#[async_trait]
impl ContainerManager for DockerContainerManager {
    async fn start_or_reuse(
        &self,
        project_id: &str,
        execution_id: &str,
        timeout: Duration,
    ) -> Result<ContainerSession> {
        match tokio::time::timeout(timeout, self.provision(project_id, execution_id)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::container(format!(
                "container setup timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn cleanup_expired(
        &self,
        max_age_days: u64,
        execution_id: Option<&str>,
    ) -> Result<CleanupStats> {
        let filter = match execution_id {
            Some(id) => format!("label={LABEL_EXECUTION}={id}"),
            None => format!("label={LABEL_EXECUTION}"),
        };
        let format = format!(
            "{{{{.ID}}}}\t{{{{.Label \"{LABEL_CREATED}\"}}}}\t{{{{.Label \"{LABEL_WORKSPACE}\"}}}}"
        );
        let listing = run_cli(
            &self.runtime,
            &["ps", "-a", "--filter", &filter, "--format", &format],
            CLI_TIMEOUT,
        )
        .await?;
        if listing.exit_code != 0 {
            return Err(TaskError::container(format!(
                "failed to list containers: {}",
                listing.stderr.trim()
            )));
        }

        // a per-execution cleanup keeps the workspace for the next attempt
        let drop_workspace = execution_id.is_none();
        let now = Utc::now().timestamp();
        let mut stats = CleanupStats::default();
        for entry in parse_listing(&listing.stdout) {
            stats.checked += 1;
            if !is_expired(entry.created, max_age_days, now) {
                continue;
            }
            if !self.remove(&["rm", "-f", &entry.id]).await {
                stats.errors += 1;
                continue;
            }
            stats.removed += 1;
            if let Some(volume) = entry.workspace.as_deref().filter(|_| drop_workspace) {
                if !self.remove(&["volume", "rm", "-f", volume]).await {
                    stats.errors += 1;
                }
            }
        }
        info!(
            checked = stats.checked,
            removed = stats.removed,
            errors = stats.errors,
            "container cleanup finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_docker_safe() {
        let name = container_name("tf", "acme/web", "run_1");
        assert!(name.starts_with("tf-acme-web-run_1-"));
        assert_eq!(name.len(), "tf-acme-web-run_1-".len() + 8);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c)));
        assert_eq!(name, container_name("tf", "acme/web", "run_1"));
    }

    #[test]
    fn names_do_not_collide_after_sanitising() {
        assert_ne!(
            container_name("tf", "acme/web", "run_1"),
            container_name("tf", "acme", "web-run_1")
        );
        assert_ne!(
            container_name("tf", "a b", "e"),
            container_name("tf", "a:b", "e")
        );
    }

    #[test]
    fn run_mounts_workspace_volume() {
        let mgr = DockerContainerManager::new(&ContainerConfig::default(), "/workspace");
        let args = mgr.run_args("tf-acme-e1-0badc0de", "acme", "e1", 1_700_000_000);
        let mount = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(args[mount + 1], "tf-acme-e1-0badc0de-workspace:/workspace");
        assert!(args.contains(&"taskforge.workspace=tf-acme-e1-0badc0de-workspace".to_string()));
        assert!(args.contains(&"taskforge.created=1700000000".to_string()));
        assert_eq!(&args[args.len() - 3..], ["node:20-bookworm", "sleep", "infinity"]);
    }

    #[test]
    fn listing_parses_labels() {
        let listed = parse_listing("abc\t1700000000\ttf-x-workspace\ndef\t\t<no value>\n\n");
        assert_eq!(
            listed,
            vec![
                ListedContainer {
                    id: "abc".into(),
                    created: 1_700_000_000,
                    workspace: Some("tf-x-workspace".into()),
                },
                ListedContainer {
                    id: "def".into(),
                    created: 0,
                    workspace: None,
                },
            ]
        );
    }

    #[test]
    fn expiry_threshold() {
        let now = 1_700_000_000;
        let day = 86_400;
        assert!(is_expired(now, 0, now));
        assert!(is_expired(now - 8 * day, 7, now));
        assert!(!is_expired(now - 6 * day, 7, now));
        assert!(!is_expired(0, u64::MAX, now));
    }

    #[test]
    fn manager_takes_config() {
        let mgr = DockerContainerManager::new(&ContainerConfig::default(), "/workspace");
        assert_eq!(mgr.runtime, "docker");
        assert_eq!(mgr.image, "node:20-bookworm");
    }

    #[tokio::test]
    async fn missing_runtime_is_container_error() {
        let cfg = ContainerConfig {
            runtime: "definitely-not-a-container-runtime".into(),
            ..ContainerConfig::default()
        };
        let mgr = DockerContainerManager::new(&cfg, "/workspace");
        let err = mgr
            .start_or_reuse("p", "e", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), tf_core::error::ErrorKind::Container);
    }
}
