//! Overdue Worker Binary
//!
//! Runs change feed consumers and timer entities until Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use overdue_core::OverdueConfig;
use overdue_worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "overdue-worker", version, about = "Flags todo items as overdue when their due date passes")]
struct Args {
    /// Config file (defaults to the user config dir if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path; overrides the config file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Number of change feed partitions; overrides the config file
    #[arg(short, long)]
    partitions: Option<u32>,
}

fn load_config(args: &Args) -> Result<OverdueConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => OverdueConfig::load(path)?,
        None => match OverdueConfig::default_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::info!("Loading config from {:?}", path);
                OverdueConfig::load(path)?
            }
            None => OverdueConfig::default(),
        },
    };

    if let Some(database) = &args.database {
        config.storage.database_path = Some(database.clone());
    }
    if let Some(partitions) = args.partitions {
        config.feed.partitions = partitions;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let worker = Worker::from_config(config)?;

    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    tracing::info!("Worker exited");
    Ok(())
}
