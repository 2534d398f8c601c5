//! Grid dispatch engine.
//!
//! Takes a list of subtasks and a pool of execution nodes, assigns each
//! subtask round-robin, and keeps every subtask moving when nodes fail:
//! a failed node is marked offline, the subtask is reassigned to a node it
//! has not tried yet, and the number of attempts is bounded.
//!
//! Layers, leaves first:
//!
//! - [`Registry`]: the worker directory (memory, file, or PostgREST).
//! - [`NodeClient`]: one `/execute` call, failures classified as [`AttemptError`].
//! - [`Failover`]: the per-subtask retry state machine.
//! - [`Dispatcher`]: concurrent fan-out/fan-in with a bounded number of calls in flight.
//! - [`Grid`]: the run coordinator: snapshot, dispatch, task-count accounting.

pub use client::{HttpNodeClient, NodeClient};
pub use config::{DispatchConfig, GridConfig, RegistryBackend, RegistryConfig, SplitterConfig};
pub use coordinator::{Grid, RunReport};
pub use dispatcher::Dispatcher;
pub use error::AttemptError;
pub use failover::Failover;
pub use record::{
    AttemptOutcome, AttemptRecord, FailureKind, Subtask, TaskResult, TaskStatus, WorkerId,
    WorkerRecord,
};
pub use registry::{
    AnyRegistry, FileRegistry, MemoryRegistry, Registry, RegistryAdmin, RestRegistry,
};
pub use splitter::{AnySplitter, ChatSplitter, LineSplitter, Splitter, parse_subtasks};

pub mod client;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod failover;
pub mod record;
pub mod registry;
pub mod splitter;
