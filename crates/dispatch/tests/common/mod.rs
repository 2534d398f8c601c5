//! Shared fixtures: a scripted node client and a call-counting registry.

#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use grid_dispatch::{
    AttemptError, MemoryRegistry, NodeClient, Registry, Subtask, WorkerId, WorkerRecord,
};
use parking_lot::Mutex;
use protocol::{ExecStatus, ExecuteResponse};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// How a scripted worker answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Completed, output is `<endpoint>:<payload>`.
    Ok,
    /// Ran but the task failed.
    ExecFailed,
    /// Connection refused.
    Down,
    /// Node-enforced timeout (408).
    Timeout,
    /// Bad secret (401).
    Reject,
    /// Request refused as invalid (422).
    Invalid,
    /// Completed after sleeping.
    Slow(Duration),
}

/// Node client answering from a per-endpoint script.
#[derive(Default)]
pub struct ScriptedClient {
    script: HashMap<String, Behaviour>,
    /// `(subtask index, worker id)` per call, in call order.
    pub calls: Mutex<Vec<(usize, WorkerId)>>,
    current: AtomicUsize,
    /// Highest number of calls observed in flight at once.
    pub peak: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(script: impl IntoIterator<Item = (&'static str, Behaviour)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(endpoint, b)| (endpoint.to_owned(), b))
                .collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(usize, WorkerId)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, subtask: usize) -> Vec<WorkerId> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| *s == subtask)
            .map(|(_, w)| *w)
            .collect()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn response(subtask: &Subtask, status: ExecStatus, output: String, error: &str) -> ExecuteResponse {
    ExecuteResponse {
        task_id: subtask.index as u64,
        status,
        output,
        error: error.to_owned(),
        executed_at: Utc::now(),
        return_code: None,
    }
}

impl NodeClient for ScriptedClient {
    async fn execute(
        &self,
        worker: &WorkerRecord,
        subtask: &Subtask,
    ) -> Result<ExecuteResponse, AttemptError> {
        self.calls.lock().push((subtask.index, worker.id));
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let behaviour = self
            .script
            .get(&worker.endpoint)
            .copied()
            .unwrap_or(Behaviour::Ok);
        if let Behaviour::Slow(delay) = behaviour {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        let output = format!("{}:{}", worker.endpoint, subtask.payload);
        match behaviour {
            Behaviour::Ok | Behaviour::Slow(_) => {
                Ok(response(subtask, ExecStatus::Completed, output, ""))
            }
            Behaviour::ExecFailed => Ok(response(
                subtask,
                ExecStatus::Failed,
                String::new(),
                "exit status 1",
            )),
            Behaviour::Down => Err(AttemptError::Transport("connection refused".into())),
            Behaviour::Timeout => Err(AttemptError::Timeout(
                "Task execution timed out after 1 seconds".into(),
            )),
            Behaviour::Reject => Err(AttemptError::Auth(
                "invalid authentication header".into(),
            )),
            Behaviour::Invalid => Err(AttemptError::Invalid {
                code: 422,
                detail: "timeout must be between 1 and 3600 seconds, got 0".into(),
            }),
        }
    }
}

/// [`MemoryRegistry`] that counts the calls made through [`Registry`].
#[derive(Default)]
pub struct CountingRegistry {
    pub inner: MemoryRegistry,
    pub list_calls: AtomicUsize,
    pub offline_calls: Mutex<Vec<WorkerId>>,
    pub increments: Mutex<Vec<WorkerId>>,
}

impl CountingRegistry {
    /// Workers `1..=n` at `http://w<id>`.
    pub fn with_pool(n: i64) -> Self {
        Self {
            inner: MemoryRegistry::with_workers(pool(n)),
            ..Self::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn offline(&self) -> Vec<WorkerId> {
        let mut ids = self.offline_calls.lock().clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn increments(&self) -> Vec<WorkerId> {
        let mut ids = self.increments.lock().clone();
        ids.sort_unstable();
        ids
    }
}

impl Registry for CountingRegistry {
    async fn list_active(&self) -> Result<Vec<WorkerRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_active().await
    }

    async fn mark_offline(&self, id: WorkerId) -> Result<()> {
        self.offline_calls.lock().push(id);
        self.inner.mark_offline(id).await
    }

    async fn increment_task_count(&self, id: WorkerId) -> Result<()> {
        self.increments.lock().push(id);
        self.inner.increment_task_count(id).await
    }
}

/// Workers `1..=n` at `http://w<id>`.
pub fn pool(n: i64) -> Vec<WorkerRecord> {
    (1..=n)
        .map(|id| WorkerRecord::new(id, format!("http://w{id}")))
        .collect()
}

/// Subtasks `0..n` with payload `task-<i>` and a one-second timeout.
pub fn subtasks(n: usize) -> Vec<Subtask> {
    Subtask::batch((0..n).map(|i| format!("task-{i}")), Duration::from_secs(1))
}
