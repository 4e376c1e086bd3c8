use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use feedpool::storage::Database;
use feedpool::{Config, Engine, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "feedpool", about = "Shared feed aggregation daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "feedpool.toml")]
    config: PathBuf,

    /// Override the database path from the config file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config).context("Failed to load configuration")?;
    if let Some(database) = &args.database {
        config.database_path = database
            .to_str()
            .context("Invalid UTF-8 in database path")?
            .to_string();
    }

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedpool/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let engine = Engine::new(db, client, &config);
    let scheduler = Scheduler::new(
        engine,
        Duration::from_secs(config.sweep_interval_minutes * 60),
        config.max_concurrent_refreshes,
    );

    scheduler.start().await.context("Failed to start scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler.stop().await;

    Ok(())
}
