//! Grid execution node: the HTTP surface, the shared-secret guard and the
//! timeout-bounded executor that runs dispatched subtasks.

pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod secret;
pub mod serve;
pub mod server;
pub mod state;

pub use auth::{AuthError, Authenticator};
pub use config::NodeConfig;
pub use error::ExecError;
pub use executor::{CommandExecutor, Executor, ProcessOutput};
pub use secret::SharedSecret;
pub use serve::{ServeHandle, serve, serve_with};
pub use state::Node;
