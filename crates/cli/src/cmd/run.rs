//! `grid run`: split, dispatch, report.

use anyhow::{Result, bail};
use dispatch::{Grid, GridConfig, RunReport, TaskResult};
use std::time::Duration;

/// Run `command` across the active workers and print every result.
pub async fn run(config: &GridConfig, command: &str, timeout: Option<u64>) -> Result<()> {
    let grid = Grid::from_config(config)?;
    let report = grid
        .execute_command(command, timeout.map(Duration::from_secs))
        .await?;
    print!("{}", render(&report)?);

    let failed = report.failed();
    if failed > 0 {
        bail!("{failed} of {} subtasks failed", report.results.len());
    }
    Ok(())
}

/// Human-readable report, one block per subtask.
pub fn render(report: &RunReport) -> Result<String> {
    let mut out = String::new();
    for result in &report.results {
        out.push_str(&summary(result));
        out.push('\n');
        if let Some(execution) = &result.execution {
            out.push_str(&serde_json::to_string_pretty(execution)?);
            out.push('\n');
        }
    }
    Ok(out)
}

/// One line describing a subtask's result.
pub fn summary(result: &TaskResult) -> String {
    let worker = result
        .worker_id
        .map_or_else(|| "-".to_owned(), |id| id.to_string());
    let state = if !result.is_success() {
        "error"
    } else if result.execution_failed() {
        "failed"
    } else {
        "ok"
    };
    let mut line = format!(
        "[{}] worker {worker} {state} after {} attempt(s)",
        result.subtask_index, result.attempts_used
    );
    if let Some(message) = &result.error_message {
        line.push_str(": ");
        line.push_str(message.trim_end());
    }
    line
}
