//! Serve entrypoint used by the binary and by tests.

use crate::{
    auth::Authenticator, config::NodeConfig, executor::Executor, server, state::Node,
};
use anyhow::Result;
use tokio::sync::oneshot;

/// Handle returned by [`serve`]: the bound port and the shutdown trigger.
pub struct ServeHandle {
    /// The port the node is listening on.
    pub port: u16,
    /// Send a value to trigger graceful shutdown.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Join handle for the server task.
    join: Option<tokio::task::JoinHandle<Result<(), std::io::Error>>>,
}

impl ServeHandle {
    /// Base URL of the running node on the loopback interface.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Trigger graceful shutdown and wait for the server to stop.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.await??;
        }
        Ok(())
    }
}

/// Build the standard node from config, bind, and start serving.
pub async fn serve(config: &NodeConfig, bind: &str) -> Result<ServeHandle> {
    let node = Node::from_config(config);
    if node.authenticator.is_open() {
        tracing::warn!("no shared secret configured, /execute accepts unauthenticated requests");
    }
    serve_with(node, bind).await
}

/// Serve an already-assembled node. The server runs in a spawned task;
/// call `handle.shutdown()` to stop it.
pub async fn serve_with<E: Executor, A: Authenticator + 'static>(
    node: Node<E, A>,
    bind: &str,
) -> Result<ServeHandle> {
    let worker_id = node.worker_id.clone();
    let app = server::router(node);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let port = listener.local_addr()?.port();
    tracing::info!("node '{worker_id}' listening on {bind} (port {port})");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("received shutdown signal");
            })
            .await
    });

    Ok(ServeHandle {
        port,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
    })
}
