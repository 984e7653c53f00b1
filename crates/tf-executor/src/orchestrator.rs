use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tf_core::config::ExecutorConfig;
use tf_core::error::{Result, TaskError};
use tf_core::types::{ExecutionContext, ExecutionResult};
use tf_core::validation::validate_context;
use tf_telemetry::metrics::{global_metrics, MetricsCollector};
use tf_telemetry::status::{elapsed_ms, ExecutionStatus};
use tf_telemetry::tracing_setup::execution_span;
use tracing::{info, warn, Instrument};

use crate::capture::{extract_commit_hash, extract_file_changes, try_capture};
use crate::container::{
    exec_checked, in_dir, path_test, tail, ContainerHandle, ContainerManager, ContainerSession,
};
use crate::services::{PromptGenerator, StatusProjection};

/// Directory, relative to the workspace, that repositories are cloned into.
pub const REPO_DIR: &str = "repo";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub tool_binary: String,
    pub tool_install_command: String,
    pub message_file_flag: String,
    pub model_flag: String,
    pub workspace_dir: String,
    pub container_setup_timeout: Duration,
    pub max_attempts: u32,
    pub package_manager: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for OrchestratorSettings {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            tool_binary: cfg.tool_binary.clone(),
            tool_install_command: cfg.tool_install_command.clone(),
            message_file_flag: cfg.message_file_flag.clone(),
            model_flag: cfg.model_flag.clone(),
            workspace_dir: cfg.workspace_dir.clone(),
            container_setup_timeout: Duration::from_secs(cfg.container_setup_timeout_secs),
            max_attempts: cfg.max_attempts,
            package_manager: cfg.package_manager.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskOrchestrator
// ---------------------------------------------------------------------------

/// Runs one stage per call inside the execution's container.
///
/// Stages are independent calls; sequencing install, build, merge and push
/// is up to the caller. The orchestrator holds no per-execution state.
pub struct TaskOrchestrator {
    pub(crate) containers: Arc<dyn ContainerManager>,
    prompts: Arc<dyn PromptGenerator>,
    pub(crate) status: Arc<dyn StatusProjection>,
    pub(crate) settings: OrchestratorSettings,
    metrics: Option<Arc<MetricsCollector>>,
}

impl TaskOrchestrator {
    pub fn new(
        containers: Arc<dyn ContainerManager>,
        prompts: Arc<dyn PromptGenerator>,
        status: Arc<dyn StatusProjection>,
    ) -> Self {
        Self {
            containers,
            prompts,
            status,
            settings: OrchestratorSettings::default(),
            metrics: None,
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        match &self.metrics {
            Some(m) => m,
            None => global_metrics(),
        }
    }

    /// Where a repository lives inside the container.
    pub fn repo_dir(&self) -> String {
        format!("{}/{REPO_DIR}", self.settings.workspace_dir.trim_end_matches('/'))
    }

    /// Explicit override, then the context's directory, then the repo dir.
    pub(crate) fn resolve_dir(&self, ctx: &ExecutionContext, override_dir: Option<&str>) -> String {
        override_dir
            .map(str::to_string)
            .or_else(|| ctx.working_directory.clone())
            .unwrap_or_else(|| self.repo_dir())
    }

    pub(crate) async fn acquire_container(&self, ctx: &ExecutionContext) -> Result<ContainerSession> {
        let timeout = self.settings.container_setup_timeout;
        let acquire = self
            .containers
            .start_or_reuse(&ctx.project_id, &ctx.execution_id, timeout);
        let session = match tokio::time::timeout(timeout, acquire).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TaskError::container(format!(
                    "container setup exceeded {}s",
                    timeout.as_secs()
                )))
            }
        };
        info!(container_id = %session.container_id, container_status = %session.status, "container ready");
        Ok(session)
    }

    // -----------------------------------------------------------------------
    // Primary task
    // -----------------------------------------------------------------------

    /// Run the coding assistant once against the execution's working copy.
    ///
    /// The result's `success` mirrors the tool's exit code; only setup,
    /// clone and delivery failures are returned as errors.
    pub async fn execute_primary_task(
        &self,
        ctx: &ExecutionContext,
        prompt_context: Option<&Value>,
        use_generated_prompt: bool,
    ) -> Result<ExecutionResult> {
        validate_context(ctx)?;
        let span = execution_span(
            &ctx.correlation_id,
            &ctx.project_id,
            &ctx.execution_id,
            "primary_task",
        );
        let start = Instant::now();
        let outcome = self
            .primary_task_inner(ctx, prompt_context, use_generated_prompt)
            .instrument(span)
            .await;
        let duration_ms = elapsed_ms(start);

        match outcome {
            Ok(result) => {
                let label = if result.success { "success" } else { "failure" };
                self.metrics().record_operation("primary_task", label, duration_ms);
                Ok(result)
            }
            Err(e) => {
                self.metrics().record_operation("primary_task", "error", duration_ms);
                warn!(
                    project_id = %ctx.project_id,
                    execution_id = %ctx.execution_id,
                    error = %e,
                    duration_ms,
                    status = %ExecutionStatus::Failed,
                    "primary task failed"
                );
                Err(e.with_context(&ctx.project_id, &ctx.execution_id))
            }
        }
    }

    async fn primary_task_inner(
        &self,
        ctx: &ExecutionContext,
        prompt_context: Option<&Value>,
        use_generated_prompt: bool,
    ) -> Result<ExecutionResult> {
        let total = Instant::now();
        let mut result = ExecutionResult::for_context(ctx);
        info!(status = %ExecutionStatus::Started, "primary task started");

        // setup
        let setup = Instant::now();
        let session = self.acquire_container(ctx).await?;
        result.container_id = Some(session.container_id.clone());
        let handle = session.handle.as_ref();
        self.ensure_tool(handle).await?;
        let workdir = self.prepare_repository(handle, ctx).await?;
        result.durations.setup_ms = elapsed_ms(setup);

        // execution
        let exec = Instant::now();
        let (command, prompt_file) = if use_generated_prompt {
            let file = self.write_prompt(handle, ctx, prompt_context).await?;
            let command =
                self.tool_command(ctx, &[self.settings.message_file_flag.clone(), file.clone()]);
            (command, Some(file))
        } else {
            (self.tool_command(ctx, &ctx.files_to_modify), None)
        };
        let run = tokio::time::timeout(
            Duration::from_secs(ctx.timeout_seconds),
            handle.exec(&in_dir(&workdir, &command)),
        )
        .await;
        if let Some(file) = &prompt_file {
            let remove = format!("rm -f {}", shell_words::quote(file));
            try_capture("prompt file removal", exec_checked(handle, &remove)).await;
        }
        let run = run.map_err(|_| {
            TaskError::execution(
                format!("{} timed out after {}s", self.settings.tool_binary, ctx.timeout_seconds),
                None,
            )
        })??;
        result.exit_code = run.exit_code;
        result.success = run.success();
        result.stdout = run.output;
        result.durations.execution_ms = elapsed_ms(exec);

        // artifacts
        let capture = Instant::now();
        self.capture_task_artifacts(handle, &workdir, &mut result).await;
        result.durations.artifact_capture_ms = elapsed_ms(capture);
        result.durations.total_ms = elapsed_ms(total);

        let status = if result.success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        info!(
            exit_code = result.exit_code,
            files = result.files_modified.len(),
            duration_ms = result.durations.total_ms,
            status = %status,
            "primary task finished"
        );
        Ok(result)
    }

    /// Check the tool is on PATH, installing it when missing. At most three execs.
    async fn ensure_tool(&self, handle: &dyn ContainerHandle) -> Result<()> {
        let version = format!("{} --version", self.settings.tool_binary);
        if handle.exec(&version).await?.success() {
            return Ok(());
        }
        info!(tool = %self.settings.tool_binary, "tool missing, installing");
        exec_checked(handle, &self.settings.tool_install_command).await?;

        let verify = handle.exec(&version).await?;
        if !verify.success() {
            return Err(TaskError::execution(
                format!("{} still unavailable after install", self.settings.tool_binary),
                Some(verify.exit_code),
            ));
        }
        Ok(())
    }

    /// Clone the context's repository into the workspace unless already
    /// present. Returns the directory the tool should run in.
    async fn prepare_repository(
        &self,
        handle: &dyn ContainerHandle,
        ctx: &ExecutionContext,
    ) -> Result<String> {
        let Some(url) = &ctx.repository_url else {
            return Ok(ctx
                .working_directory
                .clone()
                .unwrap_or_else(|| self.settings.workspace_dir.clone()));
        };

        let repo = self.repo_dir();
        if path_test(handle, "-d", &format!("{repo}/.git")).await? {
            info!(repo = %repo, "repository already present");
            return Ok(repo);
        }

        let clone = format!(
            "git clone -b {} {} {REPO_DIR}",
            shell_words::quote(ctx.branch()),
            shell_words::quote(url)
        );
        let out = handle
            .exec(&in_dir(&self.settings.workspace_dir, &clone))
            .await?;
        if !out.success() {
            return Err(TaskError::execution(
                format!("git clone failed: {}", tail(&out.output, 10)),
                Some(out.exit_code),
            ));
        }
        info!(repo = %repo, branch = ctx.branch(), "repository cloned");
        Ok(repo)
    }

    /// Generate the prompt and write it to a file inside the container.
    async fn write_prompt(
        &self,
        handle: &dyn ContainerHandle,
        ctx: &ExecutionContext,
        prompt_context: Option<&Value>,
    ) -> Result<String> {
        let response = self.prompts.generate_prompt(ctx, prompt_context).await?;
        if !response.success || response.prompt.trim().is_empty() {
            return Err(TaskError::execution("prompt generation returned no prompt", None));
        }
        let path = format!(
            "/tmp/taskforge-prompt-{}.md",
            ctx.execution_id.replace('/', "_")
        );
        let write = format!(
            "printf '%s' {} > {}",
            shell_words::quote(&response.prompt),
            shell_words::quote(&path)
        );
        exec_checked(handle, &write).await?;
        Ok(path)
    }

    /// `<tool> --model <m> <tool_args...> <trailing...>`, shell-quoted.
    pub fn tool_command(&self, ctx: &ExecutionContext, trailing: &[String]) -> String {
        let mut words = vec![
            self.settings.tool_binary.as_str(),
            self.settings.model_flag.as_str(),
            ctx.model.as_str(),
        ];
        words.extend(ctx.tool_args.iter().map(String::as_str));
        words.extend(trailing.iter().map(String::as_str));
        shell_words::join(words)
    }

    async fn capture_task_artifacts(
        &self,
        handle: &dyn ContainerHandle,
        workdir: &str,
        result: &mut ExecutionResult,
    ) {
        let version_cmd = format!("{} --version", self.settings.tool_binary);
        result.tool_version = try_capture("tool_version", exec_checked(handle, &version_cmd))
            .await
            .and_then(|v| v.lines().next().map(|l| l.trim().to_string()))
            .filter(|v| !v.is_empty());

        let files = extract_file_changes(&result.stdout);
        result.set_files(files);

        result.diff_output = try_capture(
            "diff",
            exec_checked(handle, &in_dir(workdir, "git diff HEAD~1")),
        )
        .await
        .filter(|d| !d.trim().is_empty());

        result.commit_hash = try_capture(
            "commit_hash",
            exec_checked(handle, &in_dir(workdir, "git log -1 --format=%H")),
        )
        .await
        .and_then(|out| extract_commit_hash(&out));
    }
}
