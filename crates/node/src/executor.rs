//! Task body execution under a wall-clock bound.

use crate::error::ExecError;
use std::{future::Future, io, process::Stdio, time::Duration};
use tokio::process::Command;

/// Captured result of a finished task process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the task exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one task body to completion.
///
/// Implementations must be cancel-safe: dropping the returned future stops
/// the work. [`run_with_timeout`] relies on that to enforce the bound.
pub trait Executor: Send + Sync + 'static {
    /// Run `task` and capture its output.
    fn run(&self, task: &str) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// Spawns `program args... task` as a child process.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Run `program` with `args` followed by the task body.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the task body as Python source via `<interpreter> -c`.
    pub fn python(interpreter: impl Into<String>) -> Self {
        Self::new(interpreter, vec!["-c".to_owned()])
    }

    /// The program this executor spawns.
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Executor for CommandExecutor {
    async fn run(&self, task: &str) -> io::Result<ProcessOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(task)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run `task` on `executor`, giving up after `limit`.
pub async fn run_with_timeout<E: Executor>(
    executor: &E,
    task: &str,
    limit: Duration,
) -> Result<ProcessOutput, ExecError> {
    match tokio::time::timeout(limit, executor.run(task)).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ExecError::Failed(e.to_string())),
        Err(_) => Err(ExecError::TimedOut {
            secs: limit.as_secs(),
        }),
    }
}
