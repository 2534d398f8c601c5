//! In-process worker directory.

use super::{Registry, RegistryAdmin, validate_endpoint};
use crate::record::{WorkerId, WorkerRecord};
use anyhow::{Result, anyhow};
use chrono::Utc;
use parking_lot::RwLock;
use protocol::WorkerStatus;
use std::collections::BTreeMap;

/// Worker directory held in memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    directory: RwLock<Directory>,
}

#[derive(Debug, Default)]
struct Directory {
    workers: BTreeMap<WorkerId, WorkerRecord>,
    /// Highest id ever held. New ids start above it, so removed ids are
    /// never handed out again.
    last_id: WorkerId,
}

impl MemoryRegistry {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory holding `workers`. Later duplicates of an id win.
    pub fn with_workers(workers: impl IntoIterator<Item = WorkerRecord>) -> Self {
        let workers: BTreeMap<_, _> = workers.into_iter().map(|w| (w.id, w)).collect();
        let last_id = workers.keys().next_back().map_or(0, |&id| id.max(0));
        Self {
            directory: RwLock::new(Directory { workers, last_id }),
        }
    }

    /// Active workers for `endpoints`, numbered from 1.
    pub fn from_endpoints<S: AsRef<str>>(endpoints: impl IntoIterator<Item = S>) -> Self {
        Self::with_workers(
            endpoints
                .into_iter()
                .zip(1..)
                .map(|(endpoint, id)| WorkerRecord::new(id, endpoint.as_ref())),
        )
    }

    /// Copy of one record.
    pub fn get(&self, id: WorkerId) -> Option<WorkerRecord> {
        self.directory.read().workers.get(&id).cloned()
    }

    /// Copy of every record, ascending by id.
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        self.directory.read().workers.values().cloned().collect()
    }

    pub(crate) fn update(&self, id: WorkerId, f: impl FnOnce(&mut WorkerRecord)) -> Result<()> {
        let mut directory = self.directory.write();
        let record = directory
            .workers
            .get_mut(&id)
            .ok_or_else(|| anyhow!("unknown worker id {id}"))?;
        f(record);
        Ok(())
    }

    pub(crate) fn insert(&self, endpoint: &str) -> Result<WorkerRecord> {
        let endpoint = validate_endpoint(endpoint)?;
        let mut directory = self.directory.write();
        directory.last_id += 1;
        let id = directory.last_id;
        let record = WorkerRecord::new(id, endpoint);
        directory.workers.insert(id, record.clone());
        Ok(record)
    }

    pub(crate) fn delete(&self, id: WorkerId) -> Result<()> {
        self.directory
            .write()
            .workers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("unknown worker id {id}"))
    }
}

impl Registry for MemoryRegistry {
    async fn list_active(&self) -> Result<Vec<WorkerRecord>> {
        Ok(self
            .directory
            .read()
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Active)
            .cloned()
            .collect())
    }

    async fn mark_offline(&self, id: WorkerId) -> Result<()> {
        self.update(id, |w| w.status = WorkerStatus::Offline)
    }

    async fn increment_task_count(&self, id: WorkerId) -> Result<()> {
        self.update(id, |w| {
            w.total_tasks += 1;
            w.last_ping = Some(Utc::now());
        })
    }
}

impl RegistryAdmin for MemoryRegistry {
    async fn list_all(&self) -> Result<Vec<WorkerRecord>> {
        Ok(self.snapshot())
    }

    async fn add(&self, endpoint: &str) -> Result<WorkerRecord> {
        self.insert(endpoint)
    }

    async fn remove(&self, id: WorkerId) -> Result<()> {
        self.delete(id)
    }

    async fn set_status(&self, id: WorkerId, status: WorkerStatus) -> Result<()> {
        self.update(id, |w| {
            w.status = status;
            w.last_ping = Some(Utc::now());
        })
    }
}
