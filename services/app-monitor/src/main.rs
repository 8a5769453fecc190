//! App Monitor CLI
//!
//! Command-line entry point for the HTTP application health monitor.

use std::path::PathBuf;

use app_monitor::{load_config, AppMonitorBuilder};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "app-monitor")]
#[command(about = "HTTP application health monitor with email and webhook alerts")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::debug!("Loading configuration from {:?}", args.config);
    let config = load_config(&args.config)?;

    let monitor = AppMonitorBuilder::new(config).build().await?;

    let cancel = monitor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping after the current round");
            cancel.cancel();
        }
    });

    monitor.start().await?;

    Ok(())
}
