//! Shared state for the node's request handlers.

use crate::{
    auth::Authenticator,
    config::NodeConfig,
    executor::{CommandExecutor, Executor},
    secret::SharedSecret,
};
use compact_str::CompactString;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Instant;

/// Shared state available to all request handlers.
pub struct Node<E: Executor, A: Authenticator> {
    /// Identity reported by `/health` and `/status`.
    pub worker_id: CompactString,
    /// Capabilities reported by `/status`.
    pub capabilities: Arc<[CompactString]>,
    /// Executor behind `/execute`.
    pub executor: Arc<E>,
    /// Executor behind `/execute-python`.
    pub python: Arc<E>,
    /// Authenticator.
    pub authenticator: Arc<A>,
    /// Process start, for `/health` uptime.
    pub started: Instant,
    /// Tasks currently executing.
    pub in_flight: Arc<AtomicUsize>,
}

impl<E: Executor, A: Authenticator> Clone for Node<E, A> {
    fn clone(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            capabilities: Arc::clone(&self.capabilities),
            executor: Arc::clone(&self.executor),
            python: Arc::clone(&self.python),
            authenticator: Arc::clone(&self.authenticator),
            started: self.started,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<E: Executor, A: Authenticator> Node<E, A> {
    /// Assemble a node from its parts.
    pub fn new(
        worker_id: impl Into<CompactString>,
        capabilities: Vec<CompactString>,
        executor: E,
        python: E,
        authenticator: A,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            capabilities: capabilities.into(),
            executor: Arc::new(executor),
            python: Arc::new(python),
            authenticator: Arc::new(authenticator),
            started: Instant::now(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Count a task as executing until the guard drops.
    pub(crate) fn enter(&self) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(Arc::clone(&self.in_flight))
    }
}

impl Node<CommandExecutor, SharedSecret> {
    /// Build the standard node from configuration.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            config.worker_id.clone(),
            config.capabilities.clone(),
            CommandExecutor::new(&config.executor.program, config.executor.args.clone()),
            CommandExecutor::python(&config.executor.python),
            SharedSecret::from_config(config),
        )
    }
}

/// Decrements the in-flight counter on drop.
pub(crate) struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
