//! Worker directory commands: list, add, remove, status.

use anyhow::Result;
use clap::Subcommand;
use dispatch::{RegistryAdmin, WorkerId, WorkerRecord};
use protocol::WorkerStatus;

/// Worker directory subcommands.
#[derive(Subcommand, Debug)]
pub enum WorkersCommand {
    /// List every worker.
    List,
    /// Register a node.
    Add {
        /// Node base URL.
        url: String,
    },
    /// Remove a worker.
    Remove {
        /// Worker id.
        id: WorkerId,
    },
    /// Set a worker's status (active, busy, offline).
    Status {
        /// Worker id.
        id: WorkerId,
        /// New status.
        status: WorkerStatus,
    },
}

impl WorkersCommand {
    /// Dispatch worker directory subcommands.
    pub async fn run(&self, registry: &impl RegistryAdmin) -> Result<()> {
        match self {
            Self::List => {
                let workers = registry.list_all().await?;
                if workers.is_empty() {
                    println!("No workers registered.");
                }
                for worker in &workers {
                    println!("{}", row(worker));
                }
            }
            Self::Add { url } => {
                let worker = registry.add(url).await?;
                println!("Added worker {} at {}", worker.id, worker.endpoint);
            }
            Self::Remove { id } => {
                registry.remove(*id).await?;
                println!("Removed worker {id}");
            }
            Self::Status { id, status } => {
                registry.set_status(*id, *status).await?;
                println!("Worker {id} is now {status}");
            }
        }
        Ok(())
    }
}

/// One table row for `workers list`.
pub fn row(worker: &WorkerRecord) -> String {
    let ping = worker
        .last_ping
        .map_or_else(|| "never".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
    format!(
        "{:>4}  {:<8} {:>6}  {:<19}  {}",
        worker.id,
        worker.status.as_str(),
        worker.total_tasks,
        ping,
        worker.endpoint
    )
}
