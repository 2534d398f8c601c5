//! Grid CLI: run commands across the worker pool, manage the worker
//! directory, and probe individual nodes.

pub use cmd::{Cli, Command};

pub mod cmd;
