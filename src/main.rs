//! deckd: Stream Deck class device CLI
//!
//! Opens a device through the command pipeline and drives it from the
//! command line.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

mod cli;
use cli::{Cli, Commands};

mod commands;
use commands::Context;

mod config;
use config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first: it may carry the log level
    let config_path = cli.config.clone().unwrap_or_else(DaemonConfig::default_path);
    let config = DaemonConfig::load(&config_path)?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if config_path.exists() {
        info!("Loaded config from {:?}", config_path);
    } else {
        debug!("No config at {:?}, using defaults", config_path);
    }

    let ctx = Context {
        config,
        serial: cli.serial,
    };

    match cli.command {
        // === Query Commands ===
        Commands::List { json } => commands::query::list(json)?,
        Commands::Info { json } => commands::query::info(&ctx, json).await?,

        // === Set Commands ===
        Commands::Brightness { percent } => commands::set::brightness(&ctx, percent).await?,
        Commands::Fill { color, key } => commands::set::fill(&ctx, color, key).await?,
        Commands::Image {
            file,
            key,
            strip,
            scale,
        } => commands::set::draw_image(&ctx, &file, key, strip, scale).await?,
        Commands::Logo => commands::set::logo(&ctx).await?,

        // === Monitoring ===
        Commands::Watch => commands::watch::watch(&ctx).await?,
    }

    Ok(())
}
