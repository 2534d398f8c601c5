//! Grid execution node binary entry point.
//!
//! Loads TOML configuration (optional), applies environment overrides,
//! and serves the node until ctrl-c.

use anyhow::Result;
use clap::Parser;
use grid_node::NodeConfig;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Grid execution node.
#[derive(Parser, Debug)]
#[command(name = "grid-node", about = "Grid execution node")]
struct Args {
    /// Path to a node.toml; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bind address override (`host:port`).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing from RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            let config = NodeConfig::load(path)?;
            tracing::info!("loaded configuration from {}", path.display());
            config
        }
        None => NodeConfig::default(),
    };
    config.apply_env()?;

    let bind = args.bind.unwrap_or_else(|| config.bind_address());
    let handle = grid_node::serve(&config, &bind).await?;

    shutdown_signal().await;
    handle.shutdown().await?;
    tracing::info!("node shut down");
    Ok(())
}

/// Wait for ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
    }
}
