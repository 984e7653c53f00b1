use std::time::Instant;

use tf_core::error::{Result, TaskError};
use tf_core::types::{ExecutionContext, ExecutionResult};
use tf_core::validation::validate_context;
use tf_telemetry::status::{elapsed_ms, ExecutionStatus};
use tf_telemetry::tracing_setup::execution_span;
use tracing::{info, warn, Instrument};

use crate::capture::{build_output_paths, try_capture, BUILD_OUTPUT_DIRS};
use crate::container::{exec_checked, in_dir, path_test, ContainerHandle};
use crate::orchestrator::TaskOrchestrator;
use crate::retry::RetryPolicy;

pub const DEFAULT_BUILD_SCRIPT: &str = "build";
pub const SKIP_NO_PACKAGE_JSON: &str = "no_package_json";
pub const SKIP_NO_BUILD_SCRIPT: &str = "no_build_script";

/// The subset of `package.json` the build stage reads.
#[derive(Debug, Default, serde::Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: std::collections::BTreeMap<String, String>,
}

impl TaskOrchestrator {
    // -----------------------------------------------------------------------
    // Install
    // -----------------------------------------------------------------------

    /// Install the project's dependencies, retried per `max_attempts`
    /// (defaults to the configured value).
    pub async fn execute_dependency_install(
        &self,
        ctx: &ExecutionContext,
        working_directory: Option<&str>,
        max_attempts: Option<u32>,
    ) -> Result<ExecutionResult> {
        validate_context(ctx)?;
        let policy = RetryPolicy::new(max_attempts.unwrap_or(self.settings.max_attempts))
            .map_err(|e| e.with_context(&ctx.project_id, &ctx.execution_id))?;
        let workdir = self.resolve_dir(ctx, working_directory);
        let span = execution_span(&ctx.correlation_id, &ctx.project_id, &ctx.execution_id, "install");

        let start = Instant::now();
        let outcome = policy
            .run(
                "install",
                &ctx.execution_id,
                self.containers.as_ref(),
                self.metrics(),
                |_| self.install_attempt(ctx, &workdir),
            )
            .instrument(span)
            .await;
        self.finish_retryable("install", ctx, outcome, elapsed_ms(start))
    }

    async fn install_attempt(
        &self,
        ctx: &ExecutionContext,
        workdir: &str,
    ) -> (Option<String>, Result<ExecutionResult>) {
        let session = match self.acquire_container(ctx).await {
            Ok(s) => s,
            Err(e) => return (None, Err(e)),
        };
        let id = Some(session.container_id.clone());
        let result = self.install_in(session.handle.as_ref(), ctx, workdir, id.clone()).await;
        (id, result)
    }

    async fn install_in(
        &self,
        handle: &dyn ContainerHandle,
        ctx: &ExecutionContext,
        workdir: &str,
        container_id: Option<String>,
    ) -> Result<ExecutionResult> {
        let total = Instant::now();
        let setup = Instant::now();
        self.verify_project_dir(handle, workdir).await?;

        if !path_test(handle, "-f", &format!("{workdir}/package.json")).await? {
            info!(workdir, status = %ExecutionStatus::Skipped, "no package.json, install skipped");
            let mut skipped = ExecutionResult::skipped(ctx, SKIP_NO_PACKAGE_JSON);
            skipped.container_id = container_id;
            return Ok(skipped);
        }
        let lockfile = path_test(handle, "-f", &format!("{workdir}/package-lock.json")).await?;
        let pm = &self.settings.package_manager;
        let command = if pm == "npm" && lockfile {
            "npm ci".to_string()
        } else {
            format!("{pm} install")
        };

        let mut result = ExecutionResult::for_context(ctx);
        result.container_id = container_id;
        result.durations.setup_ms = elapsed_ms(setup);

        let exec = Instant::now();
        info!(workdir, command = %command, "installing dependencies");
        let output = exec_checked(handle, &in_dir(workdir, &command)).await?;
        result.durations.execution_ms = elapsed_ms(exec);
        result.success = true;
        result.exit_code = 0;
        result.stdout = output;

        let capture = Instant::now();
        let mut files = Vec::new();
        if try_capture("lockfile", path_test(handle, "-f", &format!("{workdir}/package-lock.json")))
            .await
            .unwrap_or(false)
        {
            files.push("package-lock.json".to_string());
        }
        if try_capture("node_modules", path_test(handle, "-d", &format!("{workdir}/node_modules")))
            .await
            .unwrap_or(false)
        {
            files.push("node_modules/".to_string());
        }
        result.set_files(files);
        result.durations.artifact_capture_ms = elapsed_ms(capture);
        result.durations.total_ms = elapsed_ms(total);
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Run `<package manager> run <build_script>` (default "build"), retried
    /// per `max_attempts`.
    pub async fn execute_build(
        &self,
        ctx: &ExecutionContext,
        working_directory: Option<&str>,
        build_script: Option<&str>,
        max_attempts: Option<u32>,
    ) -> Result<ExecutionResult> {
        validate_context(ctx)?;
        let policy = RetryPolicy::new(max_attempts.unwrap_or(self.settings.max_attempts))
            .map_err(|e| e.with_context(&ctx.project_id, &ctx.execution_id))?;
        let script = build_script.unwrap_or(DEFAULT_BUILD_SCRIPT);
        if script.trim().is_empty() {
            return Err(TaskError::validation("build script name must not be empty")
                .with_context(&ctx.project_id, &ctx.execution_id));
        }
        let workdir = self.resolve_dir(ctx, working_directory);
        let span = execution_span(&ctx.correlation_id, &ctx.project_id, &ctx.execution_id, "build");

        let start = Instant::now();
        let outcome = policy
            .run(
                "build",
                &ctx.execution_id,
                self.containers.as_ref(),
                self.metrics(),
                |_| self.build_attempt(ctx, &workdir, script),
            )
            .instrument(span)
            .await;
        self.finish_retryable("build", ctx, outcome, elapsed_ms(start))
    }

    async fn build_attempt(
        &self,
        ctx: &ExecutionContext,
        workdir: &str,
        script: &str,
    ) -> (Option<String>, Result<ExecutionResult>) {
        let session = match self.acquire_container(ctx).await {
            Ok(s) => s,
            Err(e) => return (None, Err(e)),
        };
        let id = Some(session.container_id.clone());
        let result = self
            .build_in(session.handle.as_ref(), ctx, workdir, script, id.clone())
            .await;
        (id, result)
    }

    async fn build_in(
        &self,
        handle: &dyn ContainerHandle,
        ctx: &ExecutionContext,
        workdir: &str,
        script: &str,
        container_id: Option<String>,
    ) -> Result<ExecutionResult> {
        let total = Instant::now();
        let setup = Instant::now();
        self.verify_project_dir(handle, workdir).await?;

        let manifest_path = format!("{workdir}/package.json");
        if !path_test(handle, "-f", &manifest_path).await? {
            info!(workdir, status = %ExecutionStatus::Skipped, "no package.json, build skipped");
            let mut skipped = ExecutionResult::skipped(ctx, SKIP_NO_PACKAGE_JSON);
            skipped.container_id = container_id;
            return Ok(skipped);
        }

        let raw = exec_checked(handle, &format!("cat {}", shell_words::quote(&manifest_path))).await?;
        let manifest: PackageManifest = serde_json::from_str(&raw).map_err(|e| {
            TaskError::execution(format!("package.json is not valid JSON: {e}"), None)
        })?;
        if !manifest.scripts.contains_key(script) {
            info!(workdir, script, status = %ExecutionStatus::Skipped, "build script missing, build skipped");
            let mut skipped = ExecutionResult::skipped(ctx, SKIP_NO_BUILD_SCRIPT);
            skipped.container_id = container_id;
            return Ok(skipped);
        }

        let mut result = ExecutionResult::for_context(ctx);
        result.container_id = container_id;
        result.durations.setup_ms = elapsed_ms(setup);

        let exec = Instant::now();
        let command = format!(
            "{} run {}",
            self.settings.package_manager,
            shell_words::quote(script)
        );
        info!(workdir, command = %command, "running build");
        result.stdout = exec_checked(handle, &in_dir(workdir, &command)).await?;
        result.success = true;
        result.exit_code = 0;
        result.durations.execution_ms = elapsed_ms(exec);

        let capture = Instant::now();
        let list_dirs = format!(
            "for d in {}; do [ -d \"$d\" ] && echo \"$d\"; done; true",
            BUILD_OUTPUT_DIRS.join(" ")
        );
        let listing = try_capture("build_outputs", exec_checked(handle, &in_dir(workdir, &list_dirs)))
            .await
            .unwrap_or_default();
        result.set_files(build_output_paths(&listing));
        result.durations.artifact_capture_ms = elapsed_ms(capture);
        result.durations.total_ms = elapsed_ms(total);
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    /// The working directory exists and the package manager runs.
    async fn verify_project_dir(&self, handle: &dyn ContainerHandle, workdir: &str) -> Result<()> {
        if !path_test(handle, "-d", workdir).await? {
            return Err(TaskError::execution(
                format!("working directory {workdir} does not exist"),
                None,
            ));
        }
        exec_checked(handle, &format!("{} --version", self.settings.package_manager))
            .await
            .map(|_| ())
    }

    fn finish_retryable(
        &self,
        operation: &str,
        ctx: &ExecutionContext,
        outcome: Result<ExecutionResult>,
        duration_ms: u64,
    ) -> Result<ExecutionResult> {
        match outcome {
            Ok(result) => {
                let label = if result.skipped { "skipped" } else { "success" };
                self.metrics().record_operation(operation, label, duration_ms);
                info!(
                    operation,
                    project_id = %ctx.project_id,
                    execution_id = %ctx.execution_id,
                    attempts = result.attempt_count,
                    skipped = result.skipped,
                    duration_ms,
                    status = %ExecutionStatus::Completed,
                    "stage finished"
                );
                Ok(result)
            }
            Err(e) => {
                self.metrics().record_operation(operation, "error", duration_ms);
                warn!(
                    operation,
                    project_id = %ctx.project_id,
                    execution_id = %ctx.execution_id,
                    error = %e,
                    duration_ms,
                    status = %ExecutionStatus::Failed,
                    "stage failed"
                );
                Err(e.with_context(&ctx.project_id, &ctx.execution_id))
            }
        }
    }
}
