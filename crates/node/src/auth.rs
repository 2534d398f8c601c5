//! Authentication interface for `/execute*` calls.
//!
//! Defines the `Authenticator` trait checked before a task body runs.
//! The shared-secret implementation lives in `secret.rs`.

use std::future::Future;

/// Authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// A secret is configured but the request carried no header.
    Missing,
    /// The header value does not match the configured secret.
    Invalid,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing authentication header"),
            Self::Invalid => write!(f, "invalid authentication header"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Checks the credential presented with an execute request.
pub trait Authenticator: Send + Sync {
    /// Verify the presented header value, if any.
    fn authenticate(
        &self,
        presented: Option<&str>,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}
