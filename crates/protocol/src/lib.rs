//! Grid wire protocol shared between execution nodes and the dispatcher.
//!
//! Every type here is serialized as JSON over HTTP. The node side produces
//! the response types, the dispatcher consumes them.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

pub mod env;

/// Header carrying the shared secret on every `/execute*` call.
pub const SECRET_HEADER: &str = "x-grid-secret";

/// Default wall-clock bound for a task, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound a node accepts for a single task, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Default port an execution node listens on.
pub const DEFAULT_PORT: u16 = 7860;

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "grid execution node";

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Body of `POST /execute` and `POST /execute-python`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Task body handed to the node's executor.
    pub task: String,
    /// Caller-chosen identifier echoed back in the response.
    #[serde(default)]
    pub task_id: u64,
    /// Wall-clock bound in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl ExecuteRequest {
    /// Build a request, rounding the timeout up to whole seconds.
    pub fn new(task: impl Into<String>, task_id: u64, timeout: Duration) -> Self {
        let mut secs = timeout.as_secs();
        if timeout.subsec_nanos() > 0 {
            secs += 1;
        }
        Self {
            task: task.into(),
            task_id,
            timeout: secs,
        }
    }

    /// The declared timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Reject a timeout a node will not accept.
    pub fn check_timeout(&self) -> Result<(), String> {
        if (1..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            Ok(())
        } else {
            Err(format!(
                "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.timeout
            ))
        }
    }
}

/// Outcome of a task that ran to completion on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// The task exited successfully.
    Completed,
    /// The task ran but reported failure on its own terms.
    Failed,
}

/// Successful response of `POST /execute`.
///
/// A `Failed` status is still a 2xx response: the round-trip worked and the
/// task itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Echo of the request's `task_id`.
    pub task_id: u64,
    /// Completion status.
    pub status: ExecStatus,
    /// Captured standard output.
    pub output: String,
    /// Captured standard error.
    #[serde(default)]
    pub error: String,
    /// When the node finished running the task.
    pub executed_at: DateTime<Utc>,
    /// Process exit code, only reported by `/execute-python`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

/// Body of every non-2xx node response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub detail: String,
}

/// Lifecycle status of a worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Eligible for new subtasks.
    #[default]
    Active,
    /// Currently executing.
    Busy,
    /// Excluded from dispatch.
    Offline,
}

impl WorkerStatus {
    /// The lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(format!(
                "invalid status '{other}', expected one of: active, busy, offline"
            )),
        }
    }
}

/// Response of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    /// Always `active` while the process is up.
    pub status: WorkerStatus,
    /// Service name.
    pub service: CompactString,
    /// Time of the response.
    pub timestamp: DateTime<Utc>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process is up.
    pub status: CompactString,
    /// Seconds since the node started.
    pub uptime: u64,
    /// Configured node identity.
    pub worker_id: CompactString,
    /// Time of the response.
    pub timestamp: DateTime<Utc>,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `busy` while at least one task runs, `active` otherwise.
    pub status: WorkerStatus,
    /// Configured node identity.
    pub worker_id: CompactString,
    /// Advertised executor capabilities.
    pub capabilities: Vec<CompactString>,
    /// Number of tasks currently executing.
    #[serde(default)]
    pub in_flight: usize,
    /// Time of the response.
    pub timestamp: DateTime<Utc>,
}
