//! Worker directory access.
//!
//! [`Registry`] is the narrow interface the dispatch engine needs.
//! [`RegistryAdmin`] adds the CRUD used by operator tooling.

use crate::record::{WorkerId, WorkerRecord};
use anyhow::{Result, bail};
use protocol::WorkerStatus;
use std::future::Future;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;
pub use rest::RestRegistry;

mod file;
mod memory;
mod rest;

/// The worker directory as seen by the dispatch engine.
///
/// Implementations must be safe to call concurrently. No consistency is
/// promised between a `list_active` read and a later write.
pub trait Registry: Send + Sync {
    /// Workers whose status is `active`. Order is backend-defined.
    fn list_active(&self) -> impl Future<Output = Result<Vec<WorkerRecord>>> + Send;

    /// Set a worker's status to `offline`. Idempotent.
    fn mark_offline(&self, id: WorkerId) -> impl Future<Output = Result<()>> + Send;

    /// Add one to a worker's task counter and stamp `last_ping`.
    fn increment_task_count(&self, id: WorkerId) -> impl Future<Output = Result<()>> + Send;
}

/// Administrative operations over the worker directory.
pub trait RegistryAdmin: Registry {
    /// Every worker regardless of status, ascending by id.
    fn list_all(&self) -> impl Future<Output = Result<Vec<WorkerRecord>>> + Send;

    /// Register a new active worker.
    fn add(&self, endpoint: &str) -> impl Future<Output = Result<WorkerRecord>> + Send;

    /// Delete a worker.
    fn remove(&self, id: WorkerId) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite a worker's status and stamp `last_ping`.
    fn set_status(
        &self,
        id: WorkerId,
        status: WorkerStatus,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Reject endpoints that are not absolute `http`/`https` URLs.
pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| anyhow::anyhow!("invalid worker URL '{endpoint}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("invalid worker URL '{endpoint}': scheme must be http or https");
    }
    if url.host_str().is_none() {
        bail!("invalid worker URL '{endpoint}': missing host");
    }
    Ok(endpoint.trim_end_matches('/').to_owned())
}

/// Registry backend selected by configuration.
pub enum AnyRegistry {
    /// In-process directory.
    Memory(MemoryRegistry),
    /// JSON file on disk.
    File(FileRegistry),
    /// PostgREST-compatible HTTP store.
    Rest(RestRegistry),
}

impl Registry for AnyRegistry {
    async fn list_active(&self) -> Result<Vec<WorkerRecord>> {
        match self {
            Self::Memory(r) => r.list_active().await,
            Self::File(r) => r.list_active().await,
            Self::Rest(r) => r.list_active().await,
        }
    }

    async fn mark_offline(&self, id: WorkerId) -> Result<()> {
        match self {
            Self::Memory(r) => r.mark_offline(id).await,
            Self::File(r) => r.mark_offline(id).await,
            Self::Rest(r) => r.mark_offline(id).await,
        }
    }

    async fn increment_task_count(&self, id: WorkerId) -> Result<()> {
        match self {
            Self::Memory(r) => r.increment_task_count(id).await,
            Self::File(r) => r.increment_task_count(id).await,
            Self::Rest(r) => r.increment_task_count(id).await,
        }
    }
}

impl RegistryAdmin for AnyRegistry {
    async fn list_all(&self) -> Result<Vec<WorkerRecord>> {
        match self {
            Self::Memory(r) => r.list_all().await,
            Self::File(r) => r.list_all().await,
            Self::Rest(r) => r.list_all().await,
        }
    }

    async fn add(&self, endpoint: &str) -> Result<WorkerRecord> {
        match self {
            Self::Memory(r) => r.add(endpoint).await,
            Self::File(r) => r.add(endpoint).await,
            Self::Rest(r) => r.add(endpoint).await,
        }
    }

    async fn remove(&self, id: WorkerId) -> Result<()> {
        match self {
            Self::Memory(r) => r.remove(id).await,
            Self::File(r) => r.remove(id).await,
            Self::Rest(r) => r.remove(id).await,
        }
    }

    async fn set_status(&self, id: WorkerId, status: WorkerStatus) -> Result<()> {
        match self {
            Self::Memory(r) => r.set_status(id, status).await,
            Self::File(r) => r.set_status(id, status).await,
            Self::Rest(r) => r.set_status(id, status).await,
        }
    }
}
