//! platform-events - Checkpointed consumer for platform event streams
//!
#![doc = "platform-events - Checkpointed consumer for platform event streams"]
#![doc = "Main entry point for the platform-events CLI."]

use anyhow::Result;

use platform_events::cli::{Cli, Commands};
use platform_events::commands;
use platform_events::config::Config;
use platform_events::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Consume { max_batches, .. } => {
            tracing::info!("Starting consume command");
            if let Some(max) = max_batches {
                tracing::debug!("Stopping after {} batches", max);
            }
            commands::consume::run_consume(&config, max_batches).await?;
            Ok(())
        }
        Commands::Publish { data, .. } => {
            tracing::info!("Starting publish command");
            commands::publish::run_publish(&config, &data).await?;
            Ok(())
        }
        Commands::Topic { json, .. } => {
            tracing::info!("Starting topic command");
            commands::topic::run_topic(&config, json).await?;
            Ok(())
        }
        Commands::Whoami { json } => {
            tracing::info!("Starting whoami command");
            commands::whoami::run_whoami(&config, json).await?;
            Ok(())
        }
    }
}
