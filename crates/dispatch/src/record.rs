//! Run data model: workers, subtasks, attempts, results.

use chrono::{DateTime, Utc};
use protocol::{ExecStatus, ExecuteRequest, ExecuteResponse, WorkerStatus};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Worker identifier, assigned by the registry.
pub type WorkerId = i64;

/// A worker as stored in the registry.
///
/// The dispatcher only reads snapshots of these and asks the registry for
/// transitions; it never edits a record in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Immutable, unique id.
    pub id: WorkerId,
    /// Base URL of the execution node. Stored as `vm_url` in the hosted directory.
    #[serde(alias = "vm_url")]
    pub endpoint: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkerStatus,
    /// Subtasks handed to this worker across all runs.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_tasks: u64,
    /// Last time the registry heard about this worker.
    #[serde(default)]
    pub last_ping: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    /// A fresh active record.
    pub fn new(id: WorkerId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
            status: WorkerStatus::Active,
            total_tasks: 0,
            last_ping: None,
        }
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(de)?.unwrap_or_default())
}

/// One independently executable unit of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    /// 0-based position, stable for the run.
    pub index: usize,
    /// Task body sent to the node.
    pub payload: String,
    /// Wall-clock bound the node enforces.
    pub timeout: Duration,
}

impl Subtask {
    /// Create a subtask.
    pub fn new(index: usize, payload: impl Into<String>, timeout: Duration) -> Self {
        Self {
            index,
            payload: payload.into(),
            timeout,
        }
    }

    /// Reject a subtask no node would accept.
    ///
    /// The timeout is rounded up to whole seconds the way it goes on the wire.
    pub fn check(&self) -> Result<(), String> {
        ExecuteRequest::new(String::new(), self.index as u64, self.timeout).check_timeout()
    }

    /// Number the payloads in order, all with the same timeout.
    pub fn batch(payloads: impl IntoIterator<Item = String>, timeout: Duration) -> Vec<Self> {
        payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| Self::new(index, payload, timeout))
            .collect()
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The node ran the task and it completed.
    Success,
    /// The call never produced a usable response.
    TransportError,
    /// The node ran the task and the task itself failed.
    ExecutionError,
    /// The node killed the task at its declared timeout.
    Timeout,
    /// The node refused our credentials.
    Rejected,
    /// The node refused the request itself as invalid.
    InvalidRequest,
}

impl AttemptOutcome {
    /// Whether the attempt ended the subtask with a node response.
    pub fn is_round_trip(self) -> bool {
        matches!(self, Self::Success | Self::ExecutionError)
    }
}

/// One (subtask, worker) pairing that was tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Subtask index.
    pub subtask_index: usize,
    /// Worker tried.
    pub worker_id: WorkerId,
    /// How it ended.
    pub outcome: AttemptOutcome,
}

/// Terminal status of a subtask at the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// A node returned a well-formed result (which may itself report failure).
    Success,
    /// No node returned a result.
    Error,
}

/// Why a subtask ended in [`TaskStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The run started with an empty worker snapshot.
    NoWorkersAvailable,
    /// Reassignment found no worker left to try.
    PoolExhausted,
    /// The attempt budget ran out.
    RetriesExhausted,
    /// The subtask cannot be sent as-is to any node.
    InvalidRequest,
}

/// Final result for one subtask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Subtask index.
    pub subtask_index: usize,
    /// Worker that produced the result, if any.
    pub worker_id: Option<WorkerId>,
    /// Dispatch-level status.
    pub status: TaskStatus,
    /// Node output, empty on error.
    pub output: String,
    /// Human-readable reason: exhaustion message, or the node's error text.
    pub error_message: Option<String>,
    /// Number of attempts made.
    pub attempts_used: u32,
    /// The node's full response on success.
    pub execution: Option<ExecuteResponse>,
    /// Failure kind on error.
    pub failure: Option<FailureKind>,
    /// Every attempt made, in order.
    pub attempts: Vec<AttemptRecord>,
}

impl TaskResult {
    /// A node answered with a well-formed payload.
    pub fn success(
        subtask_index: usize,
        worker_id: WorkerId,
        response: ExecuteResponse,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        let error_message = (response.status == ExecStatus::Failed && !response.error.is_empty())
            .then(|| response.error.clone());
        Self {
            subtask_index,
            worker_id: Some(worker_id),
            status: TaskStatus::Success,
            output: response.output.clone(),
            error_message,
            attempts_used: attempts.len() as u32,
            execution: Some(response),
            failure: None,
            attempts,
        }
    }

    /// No node produced a result.
    pub fn failed(
        subtask_index: usize,
        failure: FailureKind,
        message: impl Into<String>,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            subtask_index,
            worker_id: None,
            status: TaskStatus::Error,
            output: String::new(),
            error_message: Some(message.into()),
            attempts_used: attempts.len() as u32,
            execution: None,
            failure: Some(failure),
            attempts,
        }
    }

    /// Whether a node returned a result.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    /// Whether the node's own execution reported failure.
    pub fn execution_failed(&self) -> bool {
        self.execution
            .as_ref()
            .is_some_and(|e| e.status == ExecStatus::Failed)
    }
}
