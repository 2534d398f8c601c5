//! Per-subtask retry state machine.
//!
//! ```text
//! Attempting(w) ──ok──────────────▶ Success
//!      │
//!      ├─invalid request─▶ Exhausted(node's rejection)
//!      └─fail─▶ Reassigning ──budget spent──▶ Exhausted("Task failed after N retries")
//!                   │
//!                   ├──no candidate──▶ Exhausted("No available workers remaining")
//!                   └──candidate c───▶ Attempting(c)
//! ```
//!
//! Every subtask runs its own loop. The only state shared between loops is
//! the registry and the run-wide set of workers that rejected our
//! credentials.

use crate::{
    client::NodeClient,
    error::AttemptError,
    record::{
        AttemptOutcome, AttemptRecord, FailureKind, Subtask, TaskResult, WorkerId, WorkerRecord,
    },
    registry::Registry,
};
use parking_lot::Mutex;
use protocol::{ExecStatus, ExecuteResponse};
use std::collections::BTreeSet;
use tokio::sync::Semaphore;

/// Message for a subtask whose reassignment found nobody left.
pub const POOL_EXHAUSTED: &str = "No available workers remaining";

/// Drives one subtask from its initial worker to a terminal result.
pub struct Failover<'a, R, C> {
    registry: &'a R,
    client: &'a C,
    limiter: &'a Semaphore,
    rejected: &'a Mutex<BTreeSet<WorkerId>>,
    max_attempts: u32,
}

impl<'a, R: Registry, C: NodeClient> Failover<'a, R, C> {
    /// Create a controller sharing `limiter` and `rejected` with its siblings.
    pub fn new(
        registry: &'a R,
        client: &'a C,
        limiter: &'a Semaphore,
        rejected: &'a Mutex<BTreeSet<WorkerId>>,
        max_attempts: u32,
    ) -> Self {
        Self {
            registry,
            client,
            limiter,
            rejected,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `subtask` starting on `initial` until success or exhaustion.
    pub async fn run(&self, subtask: &Subtask, initial: WorkerRecord) -> TaskResult {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut worker = initial;

        loop {
            match self.attempt(subtask, &worker).await {
                Ok(response) => {
                    attempts.push(AttemptRecord {
                        subtask_index: subtask.index,
                        worker_id: worker.id,
                        outcome: success_outcome(&response),
                    });
                    tracing::debug!(
                        subtask = subtask.index,
                        worker = worker.id,
                        "subtask finished with {:?}",
                        response.status
                    );
                    return TaskResult::success(subtask.index, worker.id, response, attempts);
                }
                Err(err) => {
                    attempts.push(AttemptRecord {
                        subtask_index: subtask.index,
                        worker_id: worker.id,
                        outcome: err.outcome(),
                    });
                    self.record_failure(subtask, &worker, &err).await;
                    if err.is_terminal() {
                        return TaskResult::failed(
                            subtask.index,
                            FailureKind::InvalidRequest,
                            err.to_string(),
                            attempts,
                        );
                    }
                }
            }

            if attempts.len() as u32 >= self.max_attempts {
                let message = format!("Task failed after {} retries", attempts.len());
                tracing::warn!(subtask = subtask.index, "{message}");
                return TaskResult::failed(
                    subtask.index,
                    FailureKind::RetriesExhausted,
                    message,
                    attempts,
                );
            }

            match self.reassign(subtask, &attempts).await {
                Some(next) => {
                    tracing::info!(
                        subtask = subtask.index,
                        from = worker.id,
                        to = next.id,
                        "reassigning subtask"
                    );
                    worker = next;
                }
                None => {
                    tracing::warn!(subtask = subtask.index, "{POOL_EXHAUSTED}");
                    return TaskResult::failed(
                        subtask.index,
                        FailureKind::PoolExhausted,
                        POOL_EXHAUSTED,
                        attempts,
                    );
                }
            }
        }
    }

    /// One network call, holding a concurrency permit for its duration.
    async fn attempt(
        &self,
        subtask: &Subtask,
        worker: &WorkerRecord,
    ) -> Result<ExecuteResponse, AttemptError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| AttemptError::Transport("dispatcher is shutting down".into()))?;
        tracing::debug!(
            subtask = subtask.index,
            worker = worker.id,
            "sending subtask to {}",
            worker.endpoint
        );
        self.client.execute(worker, subtask).await
    }

    /// Apply the failure policy for `err`.
    async fn record_failure(&self, subtask: &Subtask, worker: &WorkerRecord, err: &AttemptError) {
        match err {
            AttemptError::Auth(_) => {
                tracing::error!(
                    subtask = subtask.index,
                    worker = worker.id,
                    "worker rejected credentials, excluding it for this run: {err}"
                );
                self.rejected.lock().insert(worker.id);
                return;
            }
            AttemptError::Invalid { .. } => {
                tracing::error!(
                    subtask = subtask.index,
                    worker = worker.id,
                    "worker refused the subtask request: {err}"
                );
                return;
            }
            _ => {}
        }

        tracing::warn!(
            subtask = subtask.index,
            worker = worker.id,
            "attempt failed, marking worker offline: {err}"
        );
        if let Err(e) = self.registry.mark_offline(worker.id).await {
            tracing::warn!(worker = worker.id, "failed to mark worker offline: {e:#}");
        }
    }

    /// Pick the lowest-id active worker this subtask has not tried and that
    /// has not rejected us during this run.
    async fn reassign(&self, subtask: &Subtask, attempts: &[AttemptRecord]) -> Option<WorkerRecord> {
        let mut candidates = match self.registry.list_active().await {
            Ok(workers) => workers,
            Err(e) => {
                tracing::warn!(
                    subtask = subtask.index,
                    "failed to refresh active workers: {e:#}"
                );
                Vec::new()
            }
        };
        candidates.sort_by_key(|w| w.id);

        let rejected = self.rejected.lock();
        candidates.into_iter().find(|w| {
            !rejected.contains(&w.id) && !attempts.iter().any(|a| a.worker_id == w.id)
        })
    }
}

fn success_outcome(response: &ExecuteResponse) -> AttemptOutcome {
    match response.status {
        ExecStatus::Completed => AttemptOutcome::Success,
        ExecStatus::Failed => AttemptOutcome::ExecutionError,
    }
}
