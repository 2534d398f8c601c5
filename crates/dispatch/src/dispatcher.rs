//! Concurrent fan-out of subtasks over a worker snapshot.

use crate::{
    client::NodeClient,
    config::DispatchConfig,
    failover::Failover,
    record::{FailureKind, Subtask, TaskResult, WorkerId, WorkerRecord},
    registry::Registry,
};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tokio::sync::Semaphore;

/// Message for every subtask of a run that started with no workers.
pub const NO_WORKERS: &str = "No workers available";

/// Assigns subtasks round-robin and runs them all to completion.
pub struct Dispatcher<'a, R, C> {
    registry: &'a R,
    client: &'a C,
    settings: &'a DispatchConfig,
}

impl<'a, R: Registry, C: NodeClient> Dispatcher<'a, R, C> {
    /// Create a dispatcher over borrowed collaborators.
    pub fn new(registry: &'a R, client: &'a C, settings: &'a DispatchConfig) -> Self {
        Self {
            registry,
            client,
            settings,
        }
    }

    /// One result per subtask, in input order.
    ///
    /// Subtask `i` starts on `workers[i % workers.len()]`. An empty snapshot
    /// fails every subtask without touching the registry or the network, and
    /// so does a subtask whose timeout no node accepts.
    pub async fn distribute(
        &self,
        subtasks: &[Subtask],
        workers: &[WorkerRecord],
    ) -> Vec<TaskResult> {
        if workers.is_empty() {
            tracing::warn!(subtasks = subtasks.len(), "{NO_WORKERS}");
            return subtasks
                .iter()
                .map(|s| {
                    TaskResult::failed(s.index, FailureKind::NoWorkersAvailable, NO_WORKERS, vec![])
                })
                .collect();
        }

        let permits = self
            .settings
            .max_in_flight
            .unwrap_or(workers.len())
            .max(1);
        let limiter = Semaphore::new(permits);
        let rejected: Mutex<BTreeSet<WorkerId>> = Mutex::new(BTreeSet::new());
        let failover = Failover::new(
            self.registry,
            self.client,
            &limiter,
            &rejected,
            self.settings.max_attempts,
        );

        tracing::info!(
            subtasks = subtasks.len(),
            workers = workers.len(),
            in_flight = permits,
            "dispatching"
        );
        let failover = &failover;
        join_all(subtasks.iter().map(|subtask| {
            let initial = workers[subtask.index % workers.len()].clone();
            async move {
                if let Err(reason) = subtask.check() {
                    tracing::error!(subtask = subtask.index, "not dispatching: {reason}");
                    return TaskResult::failed(
                        subtask.index,
                        FailureKind::InvalidRequest,
                        reason,
                        vec![],
                    );
                }
                failover.run(subtask, initial).await
            }
        }))
        .await
    }
}
