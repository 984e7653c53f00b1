use clap::Subcommand;
use tf_core::config::Config;
use tf_executor::docker::DockerContainerManager;
use tf_executor::ContainerManager;

use super::print_json;

#[derive(Subcommand)]
pub enum ContainersCommand {
    /// Remove execution containers older than the expiry, with their
    /// workspace volumes.
    Cleanup {
        /// Age limit in days (defaults to `container.expiry_days`).
        #[arg(long)]
        days: Option<u64>,
    },
}

pub async fn run(config: &Config, action: ContainersCommand) -> anyhow::Result<()> {
    let manager = DockerContainerManager::new(&config.container, config.executor.workspace_dir.clone());
    match action {
        ContainersCommand::Cleanup { days } => {
            let days = days.unwrap_or(config.container.expiry_days);
            let stats = manager.cleanup_expired(days, None).await?;
            print_json(&stats)
        }
    }
}
