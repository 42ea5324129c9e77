//! RMONITOR daemon
//!
//! Collects one upstream timing feed and relays it, snapshot first, to any
//! number of downstream clients.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rmonitor_daemon::{Args, Pipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = args.load_config().context("Failed to load configuration")?;
    args.apply(&mut config).context("Invalid command-line option")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(config.log_level()?)
        .init();

    info!("Starting rmonitor daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config.config_path.display());

    let collector = config.collector_config();
    info!(
        mode = ?collector.mode,
        address = %collector.address(),
        charset = %config.charset,
        "Timing feed"
    );

    let pipeline = Pipeline::new(&config);
    let relay_addr = pipeline.start_relay().await?;
    info!("Relay ready on {}", relay_addr);

    pipeline
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("rmonitor daemon stopped");
    Ok(())
}
