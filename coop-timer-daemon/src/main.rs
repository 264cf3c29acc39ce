//! Coop Timer Daemon
//!
//! Serves a shared stopwatch to TCP clients and drives it from a game
//! server's `latest.log`. Stops cleanly on Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};

use coop_timer_daemon::config::{DaemonConfig, DEFAULT_CONFIG_FILE};
use coop_timer_daemon::TimerApp;

#[derive(Parser, Debug)]
#[command(version, about = "Shared co-op timer server")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the listen address
    #[arg(long)]
    address: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the logs directory
    #[arg(long)]
    logs: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    info!("Starting Coop Timer Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DaemonConfig::load(&cli.config).context("Failed to load configuration")?;
    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(logs) = cli.logs {
        config.logs = logs;
    }

    let app = TimerApp::start(&config).await?;
    info!("Listening on {}", app.local_addr());
    info!("Following {}", config.log_file().display());
    if config.password.is_none() {
        info!("No password configured, remote pause/reset disabled");
    }

    wait_for_shutdown().await?;

    info!("Ending...");
    app.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
