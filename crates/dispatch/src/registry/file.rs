//! Worker directory persisted as a JSON file.

use super::{MemoryRegistry, Registry, RegistryAdmin};
use crate::record::{WorkerId, WorkerRecord};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use protocol::WorkerStatus;
use std::path::{Path, PathBuf};

/// A [`MemoryRegistry`] loaded from disk and written back after every
/// mutation.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    inner: MemoryRegistry,
    /// Serializes writers of the temp file.
    write: Mutex<()>,
}

impl FileRegistry {
    /// Open the directory at `path`. A missing file is an empty directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let workers: Vec<WorkerRecord> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            MemoryRegistry::with_workers(workers)
        } else {
            MemoryRegistry::new()
        };
        Ok(Self {
            path,
            inner,
            write: Mutex::new(()),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current directory to disk via a temp file and rename.
    fn persist(&self) -> Result<()> {
        let _guard = self.write.lock();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.inner.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl Registry for FileRegistry {
    async fn list_active(&self) -> Result<Vec<WorkerRecord>> {
        self.inner.list_active().await
    }

    async fn mark_offline(&self, id: WorkerId) -> Result<()> {
        self.inner.mark_offline(id).await?;
        self.persist()
    }

    async fn increment_task_count(&self, id: WorkerId) -> Result<()> {
        self.inner.increment_task_count(id).await?;
        self.persist()
    }
}

impl RegistryAdmin for FileRegistry {
    async fn list_all(&self) -> Result<Vec<WorkerRecord>> {
        self.inner.list_all().await
    }

    async fn add(&self, endpoint: &str) -> Result<WorkerRecord> {
        let record = self.inner.add(endpoint).await?;
        self.persist()?;
        Ok(record)
    }

    async fn remove(&self, id: WorkerId) -> Result<()> {
        self.inner.remove(id).await?;
        self.persist()
    }

    async fn set_status(&self, id: WorkerId, status: WorkerStatus) -> Result<()> {
        self.inner.set_status(id, status).await?;
        self.persist()
    }
}
