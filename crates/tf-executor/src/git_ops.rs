use std::time::Instant;

use tf_core::error::{Result, TaskError};
use tf_core::types::{
    ExecutionContext, ExecutionResult, GitMergeOutcome, GitPushOutcome, DEFAULT_BRANCH,
};
use tf_core::validation::{validate_context, validate_merge_branches, validate_ref_name};
use tf_telemetry::status::{elapsed_ms, ExecutionStatus};
use tf_telemetry::tracing_setup::execution_span;
use tracing::{info, warn, Instrument};

use crate::capture::{
    detect_merge_conflicts, detect_push_rejection, extract_commit_hash, non_empty_lines,
    parse_conflicted_files, try_capture,
};
use crate::container::{exec_checked, in_dir, tail, ContainerHandle};
use crate::orchestrator::TaskOrchestrator;

pub const DEFAULT_REMOTE: &str = "origin";

impl TaskOrchestrator {
    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Merge `source_branch` into `target_branch` (default "main") with a
    /// merge commit. Conflicts are a failed result, not an error.
    pub async fn execute_merge(
        &self,
        ctx: &ExecutionContext,
        source_branch: &str,
        target_branch: Option<&str>,
        working_directory: Option<&str>,
    ) -> Result<ExecutionResult> {
        let target = target_branch.unwrap_or(DEFAULT_BRANCH);
        validate_context(ctx)?;
        validate_merge_branches(source_branch, target)
            .map_err(|e| e.with_context(&ctx.project_id, &ctx.execution_id))?;

        let workdir = self.resolve_dir(ctx, working_directory);
        let span = execution_span(&ctx.correlation_id, &ctx.project_id, &ctx.execution_id, "merge");
        let start = Instant::now();
        let outcome = self
            .merge_inner(ctx, source_branch, target, &workdir)
            .instrument(span)
            .await;
        self.finish_git("merge", ctx, outcome, elapsed_ms(start))
    }

    async fn merge_inner(
        &self,
        ctx: &ExecutionContext,
        source: &str,
        target: &str,
        workdir: &str,
    ) -> Result<ExecutionResult> {
        let total = Instant::now();
        let mut result = ExecutionResult::for_context(ctx);

        let setup = Instant::now();
        let session = self.acquire_container(ctx).await?;
        result.container_id = Some(session.container_id.clone());
        let handle = session.handle.as_ref();

        let checkout = format!("git checkout {}", shell_words::quote(target));
        let out = handle.exec(&in_dir(workdir, &checkout)).await?;
        if !out.success() {
            return Err(TaskError::repository(format!(
                "cannot check out {target}: {}",
                tail(&out.output, 10)
            )));
        }
        result.durations.setup_ms = elapsed_ms(setup);

        let exec = Instant::now();
        let merge = format!(
            "git merge --no-ff {} -m {}",
            shell_words::quote(source),
            shell_words::quote(&format!("Merge {source} into {target}"))
        );
        let out = handle.exec(&in_dir(workdir, &merge)).await?;
        result.durations.execution_ms = elapsed_ms(exec);
        result.exit_code = out.exit_code;
        result.stdout = out.output;

        let capture = Instant::now();
        let mut outcome = GitMergeOutcome {
            source_branch: source.to_string(),
            target_branch: target.to_string(),
            has_conflicts: false,
            conflicting_files: Vec::new(),
            commit_hash: None,
            files_changed: Vec::new(),
        };

        if detect_merge_conflicts(&result.stdout, result.exit_code) {
            let status = try_capture(
                "conflicts",
                exec_checked(handle, &in_dir(workdir, "git status --porcelain")),
            )
            .await
            .unwrap_or_default();
            outcome.has_conflicts = true;
            outcome.conflicting_files = parse_conflicted_files(&status);
            result.success = false;
            result.set_files(outcome.conflicting_files.clone());
            warn!(
                source,
                target,
                conflicts = outcome.conflicting_files.len(),
                "merge stopped on conflicts"
            );
        } else if result.exit_code != 0 {
            return Err(TaskError::repository(format!(
                "git merge {source} into {target} failed (exit {}): {}",
                result.exit_code,
                tail(&result.stdout, 10)
            )));
        } else {
            result.success = true;
            outcome.commit_hash = self.head_commit(handle, workdir).await;
            outcome.files_changed = try_capture(
                "merge_files",
                exec_checked(
                    handle,
                    &in_dir(workdir, "git show -m --first-parent --name-only --format= HEAD"),
                ),
            )
            .await
            .map(|out| non_empty_lines(&out))
            .unwrap_or_default();
            result.commit_hash = outcome.commit_hash.clone();
            result.set_files(outcome.files_changed.clone());
        }

        result.merge = Some(outcome);
        result.durations.artifact_capture_ms = elapsed_ms(capture);
        result.durations.total_ms = elapsed_ms(total);
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Push `branch_name` (default "main") to `remote_name` (default
    /// "origin"). A rejected push is a failed result; on success the status
    /// projection is told the execution completed.
    pub async fn execute_push(
        &self,
        ctx: &ExecutionContext,
        branch_name: Option<&str>,
        remote_name: Option<&str>,
        working_directory: Option<&str>,
    ) -> Result<ExecutionResult> {
        let branch = branch_name.unwrap_or(DEFAULT_BRANCH);
        let remote = remote_name.unwrap_or(DEFAULT_REMOTE);
        validate_context(ctx)?;
        validate_ref_name("branch", branch)
            .and_then(|_| validate_ref_name("remote", remote))
            .map_err(|e| e.with_context(&ctx.project_id, &ctx.execution_id))?;

        let workdir = self.resolve_dir(ctx, working_directory);
        let span = execution_span(&ctx.correlation_id, &ctx.project_id, &ctx.execution_id, "push");
        let start = Instant::now();
        let outcome = self
            .push_inner(ctx, branch, remote, &workdir)
            .instrument(span)
            .await;
        self.finish_git("push", ctx, outcome, elapsed_ms(start))
    }

    async fn push_inner(
        &self,
        ctx: &ExecutionContext,
        branch: &str,
        remote: &str,
        workdir: &str,
    ) -> Result<ExecutionResult> {
        let total = Instant::now();
        let mut result = ExecutionResult::for_context(ctx);

        let setup = Instant::now();
        let session = self.acquire_container(ctx).await?;
        result.container_id = Some(session.container_id.clone());
        let handle = session.handle.as_ref();
        result.durations.setup_ms = elapsed_ms(setup);

        let exec = Instant::now();
        let push = format!(
            "git push {} {}",
            shell_words::quote(remote),
            shell_words::quote(branch)
        );
        let out = handle.exec(&in_dir(workdir, &push)).await?;
        result.durations.execution_ms = elapsed_ms(exec);
        result.exit_code = out.exit_code;
        result.stdout = out.output;

        let capture = Instant::now();
        let mut outcome = GitPushOutcome {
            branch: branch.to_string(),
            remote: remote.to_string(),
            push_rejected: false,
            commit_hash: None,
            files_pushed: Vec::new(),
        };

        if result.exit_code == 0 {
            result.success = true;
            outcome.commit_hash = self.head_commit(handle, workdir).await;
            outcome.files_pushed = try_capture(
                "pushed_files",
                exec_checked(handle, &in_dir(workdir, "git show --name-only --format= HEAD")),
            )
            .await
            .map(|out| non_empty_lines(&out))
            .unwrap_or_default();
            result.commit_hash = outcome.commit_hash.clone();
            result.set_files(outcome.files_pushed.clone());

            if let Err(e) = self
                .status
                .update_to_completed(&ctx.execution_id, &ctx.project_id)
                .await
            {
                warn!(error = %e, "status projection update failed");
            }
        } else if detect_push_rejection(&result.stdout, result.exit_code) {
            outcome.push_rejected = true;
            result.success = false;
            warn!(branch, remote, exit_code = result.exit_code, "push rejected by remote");
        } else {
            return Err(TaskError::repository(format!(
                "git push {remote} {branch} failed (exit {}): {}",
                result.exit_code,
                tail(&result.stdout, 10)
            )));
        }

        result.push = Some(outcome);
        result.durations.artifact_capture_ms = elapsed_ms(capture);
        result.durations.total_ms = elapsed_ms(total);
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    async fn head_commit(&self, handle: &dyn ContainerHandle, workdir: &str) -> Option<String> {
        try_capture(
            "commit_hash",
            exec_checked(handle, &in_dir(workdir, "git rev-parse HEAD")),
        )
        .await
        .and_then(|out| extract_commit_hash(&out))
    }

    fn finish_git(
        &self,
        operation: &str,
        ctx: &ExecutionContext,
        outcome: Result<ExecutionResult>,
        duration_ms: u64,
    ) -> Result<ExecutionResult> {
        match outcome {
            Ok(result) => {
                let label = if result.success { "success" } else { "failure" };
                self.metrics().record_operation(operation, label, duration_ms);
                let status = if result.success {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Failed
                };
                info!(
                    operation,
                    exit_code = result.exit_code,
                    commit = result.commit_hash.as_deref().unwrap_or(""),
                    duration_ms,
                    status = %status,
                    "git stage finished"
                );
                Ok(result)
            }
            Err(e) => {
                self.metrics().record_operation(operation, "error", duration_ms);
                warn!(operation, error = %e, duration_ms, status = %ExecutionStatus::Failed, "git stage failed");
                Err(e.with_context(&ctx.project_id, &ctx.execution_id))
            }
        }
    }
}
