//! Agent-runner child mode.
//!
//! When the binary is re-invoked as `conductor agent-runner <task-file>`,
//! this module is the whole program: read the payload, delete the file,
//! execute the task, and print a single JSON result line as the last line
//! of stdout. The parent parses that final line; everything printed before
//! it is free-form progress output.

use crate::error::{ConductorError, Result};
use crate::runner::TaskPayload;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// The structured result a child prints as its final stdout line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildResult {
    /// Whether the child completed its task.
    pub success: bool,

    /// Task identifier echoed back for correlation.
    pub task_id: String,

    /// Human-readable execution report.
    pub output: String,
}

/// Read and delete the task payload file.
///
/// The payload file is single-use: it is removed as soon as it has been
/// read, before parsing, so a crash later in the child cannot leave it
/// behind for a confused re-run.
pub fn read_payload(task_file: &Path) -> Result<TaskPayload> {
    let content = std::fs::read_to_string(task_file).map_err(|e| {
        ConductorError::PayloadError(format!(
            "failed to read task file '{}': {}",
            task_file.display(),
            e
        ))
    })?;

    if let Err(e) = std::fs::remove_file(task_file) {
        debug!(path = %task_file.display(), error = %e, "failed to remove task file");
    }

    serde_json::from_str(&content).map_err(|e| {
        ConductorError::PayloadError(format!(
            "malformed task payload '{}': {}",
            task_file.display(),
            e
        ))
    })
}

/// Execute the payload and render the child's report.
///
/// Execution here is the built-in echo agent: it reports the role, the
/// task, and what context it received. Real agent backends replace the
/// runner command, not this function.
pub fn execute_payload(payload: &TaskPayload) -> ChildResult {
    let context_line = match &payload.context {
        Some(bundle) => format!(
            "context: {} ({} memories)",
            bundle.context_summary, bundle.total_memories
        ),
        None => "context: none provided".to_string(),
    };

    let output = format!(
        "agent {} completed task: {}\n{}",
        payload.agent_type, payload.task_description, context_line
    );

    ChildResult {
        success: true,
        task_id: payload.task_id.clone(),
        output,
    }
}

/// Entry point for agent-runner mode.
///
/// Prints progress to stdout and the JSON result as the final line.
/// Payload problems are the child's own failure and surface as this
/// process's non-zero exit, not the parent's.
pub fn run_agent_child(task_file: &Path) -> Result<()> {
    let payload = read_payload(task_file)?;
    debug!(task_id = %payload.task_id, agent = %payload.agent_type, "agent-runner starting");

    let result = execute_payload(&payload);

    let json = serde_json::to_string(&result).map_err(|e| {
        ConductorError::PayloadError(format!("failed to serialize child result: {}", e))
    })?;
    println!("{}", json);

    Ok(())
}

/// Parse the child's final stdout line into a [`ChildResult`].
pub fn parse_final_result(stdout: &str) -> Result<ChildResult> {
    let last_line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| {
            ConductorError::PayloadError("child produced no result line".to_string())
        })?;

    serde_json::from_str(last_line.trim()).map_err(|e| {
        ConductorError::PayloadError(format!("malformed child result line: {}", e))
    })
}
