use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use tf_cache::keys::cache_key;
use tf_cache::RepositoryCache;
use tf_core::config::Config;
use tf_core::git::ShellGitRunner;

use super::{print_json, token_from_env};

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Totals across every cache entry.
    Stats,

    /// Print the cache key for a repository URL.
    Key { url: String },

    /// Report whether a repository is cached.
    Check { url: String },

    /// Clone a repository into the cache.
    Clone {
        url: String,
        /// Environment variable holding an access token.
        #[arg(long)]
        token_env: Option<String>,
        /// Clone timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Fetch and fast-forward a cached repository.
    Fetch {
        url: String,
        #[arg(long)]
        token_env: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Validate a cached clone.
    Validate {
        url: String,
        /// Also check synchronisation with origin and working-tree state.
        #[arg(long)]
        fetch: bool,
    },

    /// Remove entries not modified within the age limit.
    Cleanup {
        #[arg(long)]
        max_age_hours: Option<u64>,
    },

    /// Remove one repository from the cache.
    Remove { url: String },
}

pub async fn run(config: &Config, action: CacheCommand) -> anyhow::Result<()> {
    let cache = RepositoryCache::from_config(&config.cache, Arc::new(ShellGitRunner));

    match action {
        CacheCommand::Stats => print_json(&cache.get_cache_statistics()?),
        CacheCommand::Key { url } => {
            println!("{}", cache_key(&url)?);
            Ok(())
        }
        CacheCommand::Check { url } => print_json(&cache.check_repository_existence(&url)?),
        CacheCommand::Clone {
            url,
            token_env,
            timeout,
        } => {
            let token = token_from_env(token_env.as_deref())?;
            let outcome = cache
                .clone_repository(&url, token.as_deref(), timeout.map(Duration::from_secs))
                .await?;
            print_json(&outcome)
        }
        CacheCommand::Fetch {
            url,
            token_env,
            timeout,
        } => {
            let token = token_from_env(token_env.as_deref())?;
            let outcome = cache
                .fetch_latest_changes(&url, token.as_deref(), timeout.map(Duration::from_secs))
                .await?;
            print_json(&outcome)
        }
        CacheCommand::Validate { url, fetch } => {
            if fetch {
                print_json(&cache.validate_fetch_operation(&url, None).await?)
            } else {
                print_json(&cache.validate_clone(&url, None).await?)
            }
        }
        CacheCommand::Cleanup { max_age_hours } => {
            let hours = max_age_hours.unwrap_or(config.cache.max_age_hours);
            print_json(&cache.cleanup_old_directories(hours)?)
        }
        CacheCommand::Remove { url } => {
            let removed = cache.remove_cache_directory(&url)?;
            print_json(&serde_json::json!({ "url": url, "removed": removed }))
        }
    }
}
