//! CLI argument parsing and subcommand dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dispatch::GridConfig;
use std::path::PathBuf;

pub use workers::WorkersCommand;

pub mod probe;
pub mod run;
pub mod workers;

/// Distributed subtask dispatch with failover.
#[derive(Parser, Debug)]
#[command(name = "grid", about = "Distributed subtask dispatch with failover")]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file. Defaults to `<config dir>/grid/grid.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a command over the active workers and run it.
    Run {
        /// Command to split and execute.
        command: String,
        /// Per-subtask timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Manage the worker directory.
    Workers {
        /// Workers subcommand.
        #[command(subcommand)]
        action: WorkersCommand,
    },
    /// Check a node's endpoints.
    Probe {
        /// Node base URL.
        url: String,
    },
}

impl Cli {
    /// Load configuration and run the selected subcommand.
    pub async fn run(self) -> Result<()> {
        let mut config = GridConfig::load_or_default(self.config.as_deref())?;
        config.apply_env();
        match self.command {
            Command::Run { command, timeout } => run::run(&config, &command, timeout).await,
            Command::Workers { action } => {
                let registry = config.registry.build()?;
                action.run(&registry).await
            }
            Command::Probe { url } => probe::probe(&url, config.secret()).await,
        }
    }
}
