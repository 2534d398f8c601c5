//! Axum router and handlers for the node's HTTP surface.

use crate::{
    auth::Authenticator,
    error::ExecError,
    executor::{self, Executor},
    state::Node,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use chrono::Utc;
use protocol::{
    ExecStatus, ExecuteRequest, ExecuteResponse, HealthResponse, RootResponse,
    SECRET_HEADER, SERVICE_NAME, StatusResponse, WorkerStatus,
};

/// Build the axum router for a node.
pub fn router<E: Executor, A: Authenticator + 'static>(node: Node<E, A>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<E, A>))
        .route("/status", get(status::<E, A>))
        .route("/execute", post(execute::<E, A>))
        .route("/execute-python", post(execute_python::<E, A>))
        .with_state(node)
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: WorkerStatus::Active,
        service: SERVICE_NAME.into(),
        timestamp: Utc::now(),
    })
}

async fn health<E: Executor, A: Authenticator>(
    State(node): State<Node<E, A>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        uptime: node.started.elapsed().as_secs(),
        worker_id: node.worker_id.clone(),
        timestamp: Utc::now(),
    })
}

async fn status<E: Executor, A: Authenticator>(
    State(node): State<Node<E, A>>,
) -> Json<StatusResponse> {
    let in_flight = node.in_flight();
    Json(StatusResponse {
        status: if in_flight > 0 {
            WorkerStatus::Busy
        } else {
            WorkerStatus::Active
        },
        worker_id: node.worker_id.clone(),
        capabilities: node.capabilities.to_vec(),
        in_flight,
        timestamp: Utc::now(),
    })
}

async fn execute<E: Executor, A: Authenticator>(
    State(node): State<Node<E, A>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, ExecError> {
    let executor = node.executor.clone();
    run_task(&node, &headers, &body, executor.as_ref(), false)
        .await
        .map(Json)
}

async fn execute_python<E: Executor, A: Authenticator>(
    State(node): State<Node<E, A>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, ExecError> {
    let python = node.python.clone();
    run_task(&node, &headers, &body, python.as_ref(), true)
        .await
        .map(Json)
}

/// Authenticate, decode, validate and run one task.
///
/// The secret is checked before the body is decoded.
async fn run_task<E: Executor, A: Authenticator>(
    node: &Node<E, A>,
    headers: &HeaderMap,
    body: &[u8],
    executor: &E,
    with_code: bool,
) -> Result<ExecuteResponse, ExecError> {
    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = node.authenticator.authenticate(presented).await {
        tracing::warn!("rejected execute request: {e}");
        return Err(e.into());
    }
    let req: ExecuteRequest = serde_json::from_slice(body)
        .map_err(|e| ExecError::Invalid(format!("invalid request body: {e}")))?;
    req.check_timeout().map_err(ExecError::Invalid)?;

    tracing::info!(task_id = req.task_id, "received task: {}", req.task);
    let _running = node.enter();
    let output = match executor::run_with_timeout(executor, &req.task, req.timeout()).await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(task_id = req.task_id, "{e}");
            return Err(e);
        }
    };

    let status = if output.success() {
        ExecStatus::Completed
    } else {
        ExecStatus::Failed
    };
    tracing::info!(task_id = req.task_id, "task finished with status {status:?}");

    Ok(ExecuteResponse {
        task_id: req.task_id,
        status,
        output: output.stdout,
        error: output.stderr,
        executed_at: Utc::now(),
        return_code: if with_code { output.code } else { None },
    })
}
