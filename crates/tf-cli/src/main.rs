//! `tf` -- cache maintenance, template checks and one-shot stage runs.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tf_core::config::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// taskforge CLI -- run project stages in containers and manage the
/// repository cache.
#[derive(Parser)]
#[command(name = "tf", version, about)]
struct Cli {
    /// Config file (defaults to ~/.taskforge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines regardless of the configured format.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Write collected metrics here when the command finishes: JSON for a
    /// `.json` path, Prometheus text otherwise.
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and maintain the repository cache.
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheCommand,
    },

    /// Sweep expired execution containers.
    Containers {
        #[command(subcommand)]
        action: commands::containers::ContainersCommand,
    },

    /// Show or check the task-list template.
    Template {
        #[command(subcommand)]
        action: commands::template::TemplateCommand,
    },

    /// Run one orchestrator stage in the execution's container.
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };

    let format = if cli.json_logs {
        "json"
    } else {
        config.general.log_format.as_str()
    };
    tf_telemetry::logging::init_logging_with_format("tf", &config.general.log_level, format);

    let outcome = match cli.command {
        Commands::Cache { action } => commands::cache::run(&config, action).await,
        Commands::Containers { action } => commands::containers::run(&config, action).await,
        Commands::Template { action } => commands::template::run(action),
        Commands::Run(args) => commands::run::run(&config, args).await,
    };

    if let Some(path) = &cli.metrics_file {
        commands::write_metrics(path, tf_telemetry::metrics::global_metrics())
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_cache_clone_with_token_env() {
        let cli = Cli::try_parse_from([
            "tf",
            "cache",
            "clone",
            "https://github.com/acme/web.git",
            "--token-env",
            "GH_TOKEN",
            "--timeout",
            "60",
        ])
        .unwrap();
        match cli.command {
            Commands::Cache {
                action:
                    commands::cache::CacheCommand::Clone {
                        url,
                        token_env,
                        timeout,
                    },
            } => {
                assert_eq!(url, "https://github.com/acme/web.git");
                assert_eq!(token_env.as_deref(), Some("GH_TOKEN"));
                assert_eq!(timeout, Some(60));
            }
            _ => panic!("expected cache clone"),
        }
    }

    #[test]
    fn parses_task_with_trailing_tool_args() {
        let cli = Cli::try_parse_from([
            "tf",
            "--json-logs",
            "run",
            "--project",
            "p1",
            "--execution",
            "e1",
            "task",
            "--repo",
            "https://github.com/acme/web.git",
            "--file",
            "src/a.ts",
            "--",
            "--yes",
        ])
        .unwrap();
        assert!(cli.json_logs);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.project, "p1");
        match args.stage {
            commands::run::Stage::Task {
                files, tool_args, ..
            } => {
                assert_eq!(files, vec!["src/a.ts"]);
                assert_eq!(tool_args, vec!["--yes"]);
            }
            _ => panic!("expected task stage"),
        }
    }

    #[test]
    fn parses_containers_cleanup() {
        let cli = Cli::try_parse_from(["tf", "containers", "cleanup", "--days", "3"]).unwrap();
        match cli.command {
            Commands::Containers {
                action: commands::containers::ContainersCommand::Cleanup { days },
            } => assert_eq!(days, Some(3)),
            _ => panic!("expected containers cleanup"),
        }

        let cli = Cli::try_parse_from(["tf", "containers", "cleanup"]).unwrap();
        match cli.command {
            Commands::Containers {
                action: commands::containers::ContainersCommand::Cleanup { days },
            } => assert_eq!(days, None),
            _ => panic!("expected containers cleanup"),
        }
    }

    #[test]
    fn metrics_file_is_global() {
        let cli = Cli::try_parse_from(["tf", "cache", "stats", "--metrics-file", "/tmp/tf.prom"])
            .unwrap();
        assert_eq!(cli.metrics_file, Some(PathBuf::from("/tmp/tf.prom")));
    }

    #[test]
    fn merge_requires_source() {
        assert!(Cli::try_parse_from([
            "tf", "run", "--project", "p", "--execution", "e", "merge"
        ])
        .is_err());
    }
}
