//! Outbound calls to execution nodes.

use crate::{
    error::AttemptError,
    record::{Subtask, WorkerRecord},
};
use anyhow::Result;
use compact_str::CompactString;
use protocol::{ErrorBody, ExecuteRequest, ExecuteResponse, SECRET_HEADER};
use reqwest::{Client, StatusCode};
use std::{future::Future, time::Duration};

/// Sends one subtask to one worker.
pub trait NodeClient: Send + Sync {
    /// Run `subtask` on `worker`, classifying every failure.
    fn execute(
        &self,
        worker: &WorkerRecord,
        subtask: &Subtask,
    ) -> impl Future<Output = Result<ExecuteResponse, AttemptError>> + Send;
}

/// [`NodeClient`] speaking the node's HTTP contract.
#[derive(Clone)]
pub struct HttpNodeClient {
    client: Client,
    secret: Option<CompactString>,
    /// Added to the subtask timeout so the node's own bound fires first.
    grace: Duration,
}

impl HttpNodeClient {
    /// Build a client. `secret` is sent on every call when set.
    pub fn new(secret: Option<&str>, grace: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, secret, grace))
    }

    /// Build on an existing reqwest client.
    pub fn with_client(client: Client, secret: Option<&str>, grace: Duration) -> Self {
        Self {
            client,
            secret: secret.filter(|s| !s.is_empty()).map(CompactString::new),
            grace,
        }
    }

    fn execute_url(endpoint: &str) -> String {
        format!("{}/execute", endpoint.trim_end_matches('/'))
    }
}

impl NodeClient for HttpNodeClient {
    async fn execute(
        &self,
        worker: &WorkerRecord,
        subtask: &Subtask,
    ) -> Result<ExecuteResponse, AttemptError> {
        let request = ExecuteRequest::new(
            subtask.payload.as_str(),
            subtask.index as u64,
            subtask.timeout,
        );
        let mut builder = self
            .client
            .post(Self::execute_url(&worker.endpoint))
            .timeout(request.timeout() + self.grace)
            .json(&request);
        if let Some(secret) = &self.secret {
            builder = builder.header(SECRET_HEADER, secret.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Transport(format!("request timed out: {e}"))
            } else {
                AttemptError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown status");
            let detail = match response.json::<ErrorBody>().await {
                Ok(body) => body.detail,
                Err(_) => reason.to_owned(),
            };
            return Err(match status {
                StatusCode::UNAUTHORIZED => AttemptError::Auth(detail),
                StatusCode::REQUEST_TIMEOUT => AttemptError::Timeout(detail),
                StatusCode::BAD_REQUEST
                | StatusCode::PAYLOAD_TOO_LARGE
                | StatusCode::UNSUPPORTED_MEDIA_TYPE
                | StatusCode::UNPROCESSABLE_ENTITY => AttemptError::Invalid {
                    code: status.as_u16(),
                    detail,
                },
                _ => AttemptError::Status {
                    code: status.as_u16(),
                    detail,
                },
            });
        }

        let body: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Malformed(e.to_string()))?;
        if body.task_id != request.task_id {
            return Err(AttemptError::Malformed(format!(
                "task_id mismatch: sent {}, got {}",
                request.task_id, body.task_id
            )));
        }
        Ok(body)
    }
}
