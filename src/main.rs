mod bot;
mod config;
mod ledger;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::ledger::{InMemoryLedger, LoyaltyLedger, SqliteLedger};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up USER_NAME / USER_OAUTH_TOKEN / USER_CHANNEL from a local .env if present
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loyaltybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Bot account: {}", config.twitch.user_name);
    info!("  Channel: #{}", config.twitch.channel);
    info!("  Outgoing capacity: {}", config.outgoing.capacity);

    let ledger: Arc<dyn LoyaltyLedger> = if config.ledger.in_memory {
        info!("  Ledger: in memory (nothing will be saved)");
        Arc::new(InMemoryLedger::new())
    } else {
        info!("  Ledger: {}", config.ledger.database_path.display());
        Arc::new(SqliteLedger::open(&config.ledger.database_path)?)
    };

    info!("Bot is starting...");
    bot::run(config, ledger).await?;

    Ok(())
}
