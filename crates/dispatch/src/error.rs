//! Attempt failure taxonomy.

use crate::record::AttemptOutcome;

/// Why one `/execute` call did not yield a usable result.
///
/// A node reporting `status: failed` is not an `AttemptError`: the
/// round-trip worked and the result is passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    /// Connection refused, DNS failure, client-side request timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-2xx response not covered by another variant.
    #[error("worker responded {code}: {detail}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Detail from the error body, or the status reason.
        detail: String,
    },
    /// 2xx response whose body could not be used.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The node rejected our shared secret.
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// The node killed the task at its declared timeout.
    #[error("worker timed out: {0}")]
    Timeout(String),
    /// 400, 413, 415 or 422: the node refused the request we built.
    #[error("request rejected with {code}: {detail}")]
    Invalid {
        /// HTTP status code.
        code: u16,
        /// Detail from the error body, or the status reason.
        detail: String,
    },
}

impl AttemptError {
    /// The attempt outcome recorded for this failure.
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Transport(_) | Self::Status { .. } | Self::Malformed(_) => {
                AttemptOutcome::TransportError
            }
            Self::Timeout(_) => AttemptOutcome::Timeout,
            Self::Auth(_) => AttemptOutcome::Rejected,
            Self::Invalid { .. } => AttemptOutcome::InvalidRequest,
        }
    }

    /// Whether the worker should be marked offline in the registry.
    ///
    /// Auth and request rejections come from a live node, so it stays online.
    pub fn marks_offline(&self) -> bool {
        !matches!(self, Self::Auth(_) | Self::Invalid { .. })
    }

    /// Whether retrying on another worker is pointless.
    ///
    /// Every node receives the same request body.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }
}
