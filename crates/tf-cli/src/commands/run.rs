use std::sync::Arc;

use clap::{Args, Subcommand};
use tf_core::config::Config;
use tf_core::error::TaskError;
use tf_core::types::ExecutionContext;
use tf_executor::docker::DockerContainerManager;
use tf_executor::services::{NoopStatusProjection, StaticPromptGenerator};
use tf_executor::{OrchestratorSettings, TaskOrchestrator};
use tf_telemetry::status::timed;

use super::print_json;

#[derive(Args)]
pub struct RunArgs {
    /// Project the execution belongs to.
    #[arg(long)]
    pub project: String,

    /// Execution identifier; selects the container.
    #[arg(long)]
    pub execution: String,

    /// Working directory inside the container.
    #[arg(long)]
    pub workdir: Option<String>,

    /// Per-command timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub stage: Stage,
}

#[derive(Subcommand)]
pub enum Stage {
    /// Install dependencies (`npm ci` when a lockfile is present).
    Install {
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Run the project's build script.
    Build {
        #[arg(long)]
        script: Option<String>,
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Merge a branch into the target branch.
    Merge {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: Option<String>,
    },

    /// Push a branch to its remote.
    Push {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        remote: Option<String>,
    },

    /// Run the coding assistant against the repository.
    Task {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Prompt text; written to a message file inside the container.
        #[arg(long)]
        prompt: Option<String>,
        /// Files the assistant should edit.
        #[arg(long = "file")]
        files: Vec<String>,
        /// Extra arguments passed to the assistant verbatim.
        #[arg(last = true)]
        tool_args: Vec<String>,
    },
}

pub async fn run(config: &Config, args: RunArgs) -> anyhow::Result<()> {
    let settings = OrchestratorSettings::from(&config.executor);
    let containers = DockerContainerManager::new(&config.container, settings.workspace_dir.clone());
    let prompts = match stage_prompt(&args.stage) {
        Some(p) => StaticPromptGenerator::with_prompt(p),
        None => StaticPromptGenerator::new(),
    };
    let orchestrator = TaskOrchestrator::new(
        Arc::new(containers),
        Arc::new(prompts),
        Arc::new(NoopStatusProjection),
    )
    .with_settings(settings);

    let mut ctx = ExecutionContext::new(&args.project, &args.execution);
    if let Some(dir) = &args.workdir {
        ctx = ctx.with_working_directory(dir);
    }
    if let Some(secs) = args.timeout {
        ctx.timeout_seconds = secs;
    }

    tracing::info!(
        project_id = %ctx.project_id,
        execution_id = %ctx.execution_id,
        correlation_id = %ctx.correlation_id,
        "running stage"
    );

    let operation = args.stage.name();
    let (result, _) = timed(operation, async {
        let result = match args.stage {
            Stage::Install { max_attempts } => {
                orchestrator
                    .execute_dependency_install(&ctx, None, max_attempts)
                    .await?
            }
            Stage::Build {
                script,
                max_attempts,
            } => {
                orchestrator
                    .execute_build(&ctx, None, script.as_deref(), max_attempts)
                    .await?
            }
            Stage::Merge { source, target } => {
                orchestrator
                    .execute_merge(&ctx, &source, target.as_deref(), None)
                    .await?
            }
            Stage::Push { branch, remote } => {
                orchestrator
                    .execute_push(&ctx, branch.as_deref(), remote.as_deref(), None)
                    .await?
            }
            Stage::Task {
                repo,
                branch,
                model,
                prompt,
                files,
                tool_args,
            } => {
                let branch = branch.unwrap_or_else(|| tf_core::types::DEFAULT_BRANCH.to_string());
                let mut ctx = ctx.with_repository(repo, branch);
                if let Some(model) = model {
                    ctx.model = model;
                }
                ctx.files_to_modify = files;
                ctx.tool_args = tool_args;
                orchestrator
                    .execute_primary_task(&ctx, None, prompt.is_some())
                    .await?
            }
        };
        Ok::<_, TaskError>(result)
    })
    .await;
    let result = result?;

    print_json(&result)?;
    if !result.success {
        anyhow::bail!("stage finished unsuccessfully (exit code {})", result.exit_code);
    }
    Ok(())
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Install { .. } => "install",
            Stage::Build { .. } => "build",
            Stage::Merge { .. } => "merge",
            Stage::Push { .. } => "push",
            Stage::Task { .. } => "primary_task",
        }
    }
}

fn stage_prompt(stage: &Stage) -> Option<String> {
    match stage {
        Stage::Task { prompt, .. } => prompt.clone(),
        _ => None,
    }
}
