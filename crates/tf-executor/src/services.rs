use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tf_core::error::Result;
use tf_core::types::ExecutionContext;
use tracing::info;

// ---------------------------------------------------------------------------
// Prompt generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub success: bool,
    pub prompt: String,
}

/// Produces the instructions handed to the coding assistant.
#[async_trait]
pub trait PromptGenerator: Send + Sync {
    async fn generate_prompt(
        &self,
        ctx: &ExecutionContext,
        prompt_context: Option<&Value>,
    ) -> Result<PromptResponse>;
}

/// Returns a fixed prompt, or one assembled from the context when none is set.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptGenerator {
    prompt: Option<String>,
}

impl StaticPromptGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

#[async_trait]
impl PromptGenerator for StaticPromptGenerator {
    async fn generate_prompt(
        &self,
        ctx: &ExecutionContext,
        prompt_context: Option<&Value>,
    ) -> Result<PromptResponse> {
        if let Some(prompt) = &self.prompt {
            return Ok(PromptResponse {
                success: true,
                prompt: prompt.clone(),
            });
        }

        let mut prompt = format!("Project: {}\n", ctx.project_id);
        if let Some(task) = prompt_context
            .and_then(|v| v.get("task"))
            .and_then(Value::as_str)
        {
            prompt.push_str(&format!("\nTask:\n{task}\n"));
        }
        if !ctx.files_to_modify.is_empty() {
            prompt.push_str("\nFiles to modify:\n");
            for file in &ctx.files_to_modify {
                prompt.push_str(&format!("- {file}\n"));
            }
        }
        Ok(PromptResponse {
            success: true,
            prompt,
        })
    }
}

// ---------------------------------------------------------------------------
// Status projection
// ---------------------------------------------------------------------------

/// Read model updated once a workflow completes.
#[async_trait]
pub trait StatusProjection: Send + Sync {
    async fn update_to_completed(&self, execution_id: &str, project_id: &str) -> Result<()>;
}

/// Logs the transition and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusProjection;

#[async_trait]
impl StatusProjection for NoopStatusProjection {
    async fn update_to_completed(&self, execution_id: &str, project_id: &str) -> Result<()> {
        info!(execution_id, project_id, "execution marked completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn derived_prompt_mentions_task_and_files() {
        let mut ctx = ExecutionContext::new("proj", "exec");
        ctx.files_to_modify = vec!["src/app.js".into()];
        let task = serde_json::json!({ "task": "Add a login form" });

        let resp = StaticPromptGenerator::new()
            .generate_prompt(&ctx, Some(&task))
            .await
            .unwrap();
        assert!(resp.success);
        assert!(resp.prompt.contains("Add a login form"));
        assert!(resp.prompt.contains("- src/app.js"));
    }

    #[tokio::test]
    async fn fixed_prompt_wins() {
        let ctx = ExecutionContext::new("proj", "exec");
        let resp = StaticPromptGenerator::with_prompt("do it")
            .generate_prompt(&ctx, None)
            .await
            .unwrap();
        assert_eq!(resp.prompt, "do it");
    }
}
