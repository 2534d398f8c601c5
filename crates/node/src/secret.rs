//! Shared-secret authenticator.
//!
//! With no secret configured every request passes (explicit insecure mode).

use crate::{
    auth::{AuthError, Authenticator},
    config::NodeConfig,
};
use compact_str::CompactString;

/// Authenticates requests by comparing a header against one shared secret.
#[derive(Debug, Clone, Default)]
pub struct SharedSecret {
    secret: Option<CompactString>,
}

impl SharedSecret {
    /// Require `secret` on every request.
    pub fn new(secret: impl Into<CompactString>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }

    /// Accept every request.
    pub fn open() -> Self {
        Self { secret: None }
    }

    /// Create from [`NodeConfig`]. An empty secret counts as unset.
    pub fn from_config(config: &NodeConfig) -> Self {
        match protocol::env::non_empty(config.secret.clone()) {
            Some(secret) => Self::new(secret),
            None => Self::open(),
        }
    }

    /// Whether the check is skipped.
    pub fn is_open(&self) -> bool {
        self.secret.is_none()
    }
}

impl Authenticator for SharedSecret {
    fn authenticate(
        &self,
        presented: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), AuthError>> + Send {
        let result = match (&self.secret, presented) {
            (None, _) => Ok(()),
            (Some(_), None) => Err(AuthError::Missing),
            (Some(expected), Some(given)) => {
                if constant_time_eq(expected.as_bytes(), given.as_bytes()) {
                    Ok(())
                } else {
                    Err(AuthError::Invalid)
                }
            }
        };
        std::future::ready(result)
    }
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
