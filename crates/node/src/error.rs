//! Execute endpoint failures and their HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use protocol::ErrorBody;

/// Why an `/execute*` call did not produce a task result.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Shared-secret check failed.
    #[error("authentication failed: {0}")]
    Unauthorized(#[from] crate::AuthError),
    /// The request was well-formed JSON but out of range.
    #[error("{0}")]
    Invalid(String),
    /// The task exceeded its declared timeout and was killed.
    #[error("Task execution timed out after {secs} seconds")]
    TimedOut {
        /// The declared bound.
        secs: u64,
    },
    /// The executor could not run the task at all.
    #[error("Task execution failed: {0}")]
    Failed(String),
}

impl ExecError {
    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TimedOut { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExecError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
