use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use tf_cache::template::{get_default_task_list_template, validate_template_format};

use super::print_json;

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Print the default task-list template.
    Show,

    /// Check a template file; exits non-zero when it has errors.
    Validate { file: PathBuf },
}

pub fn run(action: TemplateCommand) -> anyhow::Result<()> {
    match action {
        TemplateCommand::Show => {
            print!("{}", get_default_task_list_template());
            Ok(())
        }
        TemplateCommand::Validate { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = validate_template_format(&content);
            print_json(&report)?;
            if !report.is_valid {
                anyhow::bail!("template has {} error(s)", report.errors.len());
            }
            Ok(())
        }
    }
}
