//! Run coordinator: snapshot, dispatch, account.

use crate::{
    client::{HttpNodeClient, NodeClient},
    config::{DispatchConfig, GridConfig},
    dispatcher::Dispatcher,
    record::{Subtask, TaskResult, WorkerId, WorkerRecord},
    registry::{AnyRegistry, Registry},
    splitter::{AnySplitter, Splitter},
};
use anyhow::{Context, Result, bail};
use std::{collections::BTreeSet, time::Duration};

/// Everything a run needs, built once and borrowed by each run.
pub struct Grid<R, C, S> {
    registry: R,
    client: C,
    splitter: S,
    dispatch: DispatchConfig,
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One result per subtask, in input order.
    pub results: Vec<TaskResult>,
    /// The worker snapshot the run started from.
    pub workers: Vec<WorkerRecord>,
}

impl RunReport {
    /// Whether every subtask got a result from some node.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(TaskResult::is_success)
    }

    /// Number of subtasks that got no result.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Distinct workers that received at least one attempt, ascending.
    pub fn attempted_workers(&self) -> BTreeSet<WorkerId> {
        attempted_workers(&self.results)
    }
}

impl Grid<AnyRegistry, HttpNodeClient, AnySplitter> {
    /// Build the registry, node client and splitter named by `config`.
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        let registry = config
            .registry
            .build()
            .context("failed to open worker registry")?;
        let client = HttpNodeClient::new(config.secret(), config.dispatch.request_grace())?;
        Ok(Self::new(
            registry,
            client,
            config.splitter.build(),
            config.dispatch.clone(),
        ))
    }
}

impl<R: Registry, C: NodeClient, S: Splitter> Grid<R, C, S> {
    /// Assemble a grid from parts.
    pub fn new(registry: R, client: C, splitter: S, dispatch: DispatchConfig) -> Self {
        Self {
            registry,
            client,
            splitter,
            dispatch,
        }
    }

    /// The worker directory.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The node client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Dispatch settings.
    pub fn settings(&self) -> &DispatchConfig {
        &self.dispatch
    }

    /// Active workers, ascending by id.
    pub async fn snapshot(&self) -> Result<Vec<WorkerRecord>> {
        let mut workers = self
            .registry
            .list_active()
            .await
            .context("failed to list active workers")?;
        workers.sort_by_key(|w| w.id);
        Ok(workers)
    }

    /// Run `payloads` with the default timeout against the current pool.
    pub async fn run(&self, payloads: Vec<String>) -> Result<RunReport> {
        let subtasks = Subtask::batch(payloads, self.dispatch.default_timeout());
        let workers = self.snapshot().await?;
        Ok(self.run_with(&subtasks, workers).await)
    }

    /// Run `subtasks` against a given snapshot.
    pub async fn run_with(&self, subtasks: &[Subtask], workers: Vec<WorkerRecord>) -> RunReport {
        let results = Dispatcher::new(&self.registry, &self.client, &self.dispatch)
            .distribute(subtasks, &workers)
            .await;

        for id in attempted_workers(&results) {
            if let Err(e) = self.registry.increment_task_count(id).await {
                tracing::warn!(worker = id, "failed to update task count: {e:#}");
            }
        }

        let report = RunReport { results, workers };
        tracing::info!(
            subtasks = report.results.len(),
            failed = report.failed(),
            "run finished"
        );
        report
    }

    /// Split `command` into at most one subtask per active worker and run it.
    pub async fn execute_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<RunReport> {
        let timeout = timeout.unwrap_or_else(|| self.dispatch.default_timeout());
        Subtask::new(0, command, timeout)
            .check()
            .map_err(anyhow::Error::msg)?;

        let workers = self.snapshot().await?;
        if workers.is_empty() {
            bail!("no active workers available");
        }

        let payloads = self
            .splitter
            .split(command, workers.len())
            .await
            .context("failed to split command")?;
        if payloads.is_empty() {
            bail!("command produced no subtasks");
        }

        tracing::info!(
            subtasks = payloads.len(),
            workers = workers.len(),
            "executing command"
        );
        let subtasks = Subtask::batch(payloads, timeout);
        Ok(self.run_with(&subtasks, workers).await)
    }
}

fn attempted_workers(results: &[TaskResult]) -> BTreeSet<WorkerId> {
    results
        .iter()
        .flat_map(|r| r.attempts.iter().map(|a| a.worker_id))
        .collect()
}
