//! Agent subprocess execution.
//!
//! A delegated task is handed to a child process through a temporary JSON
//! payload file: the parent writes the payload, spawns the child with the
//! payload path as its argument, and the child deletes the file after
//! reading it. Output is captured through temporary files rather than
//! pipes, so a chatty child cannot deadlock the parent.
//!
//! By default the child is this same executable re-invoked in agent-runner
//! mode; a command override (parsed with shell semantics) substitutes any
//! other runner binary.

pub mod child;
pub mod framework;

use crate::context::ContextBundle;
use crate::error::{ConductorError, Result};
use crate::roles::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Prefix for temporary task payload files.
pub const TASK_FILE_PREFIX: &str = "conductor-task-";

/// Payload files older than this are leftovers from crashed runs and are
/// removed on runner construction.
pub const STALE_TASK_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on captured stderr length.
pub const DEFAULT_MAX_STDERR_LEN: usize = 2000;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything a child agent needs to execute one delegated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Identifier for correlating parent and child logs.
    pub task_id: String,

    /// Role the child should assume.
    pub agent_type: AgentType,

    /// The task to perform.
    pub task_description: String,

    /// Prepared context bundle, absent when preparation was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextBundle>,

    /// When the parent created the payload.
    pub created_at: DateTime<Utc>,
}

impl TaskPayload {
    pub fn new(
        task_id: impl Into<String>,
        agent_type: AgentType,
        task_description: impl Into<String>,
        context: Option<ContextBundle>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_type,
            task_description: task_description.into(),
            context,
            created_at: Utc::now(),
        }
    }
}

/// Result of running one agent subprocess.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code (None if killed or terminated abnormally).
    pub exit_code: Option<i32>,
    /// Whether the process was killed due to timeout.
    pub timed_out: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr, truncated to the configured cap.
    pub stderr: String,
    /// Wall-clock execution time.
    pub duration: Duration,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Spawns and supervises agent subprocesses.
pub struct SubprocessRunner {
    command_override: Option<String>,
    task_dir: PathBuf,
    working_dir: Option<PathBuf>,
    max_stderr_len: usize,
}

impl SubprocessRunner {
    /// Runner writing payloads to the system temp directory.
    ///
    /// Stale payload files from crashed earlier runs are swept here, on
    /// construction rather than per spawn.
    pub fn new() -> Self {
        let task_dir = std::env::temp_dir();
        let removed = sweep_stale_task_files(&task_dir, STALE_TASK_MAX_AGE);
        if removed > 0 {
            debug!(removed, dir = %task_dir.display(), "swept stale task payload files");
        }

        Self {
            command_override: None,
            task_dir,
            working_dir: None,
            max_stderr_len: DEFAULT_MAX_STDERR_LEN,
        }
    }

    /// Replace the default self-invocation with an explicit runner command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command_override = Some(command.into());
        self
    }

    /// Write payload files under `dir` instead of the system temp directory.
    pub fn with_task_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task_dir = dir.into();
        self
    }

    /// Run children in `dir` instead of inheriting the parent's cwd.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Cap captured stderr at `len` bytes (keeping the tail).
    pub fn with_max_stderr_len(mut self, len: usize) -> Self {
        self.max_stderr_len = len;
        self
    }

    /// Write the payload to a uniquely named file in the task directory.
    ///
    /// The file is persisted (not auto-deleted): the child owns its
    /// lifetime and removes it after reading.
    pub fn write_payload(&self, payload: &TaskPayload) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(payload).map_err(|e| {
            ConductorError::PayloadError(format!(
                "failed to serialize task payload for '{}': {}",
                payload.task_id, e
            ))
        })?;

        let mut file = tempfile::Builder::new()
            .prefix(TASK_FILE_PREFIX)
            .suffix(".json")
            .tempfile_in(&self.task_dir)
            .map_err(|e| {
                ConductorError::PayloadError(format!(
                    "failed to create task payload file in '{}': {}",
                    self.task_dir.display(),
                    e
                ))
            })?;

        use std::io::Write;
        file.write_all(json.as_bytes()).map_err(|e| {
            ConductorError::PayloadError(format!("failed to write task payload: {}", e))
        })?;

        let (_, path) = file.keep().map_err(|e| {
            ConductorError::PayloadError(format!("failed to persist task payload file: {}", e))
        })?;

        Ok(path)
    }

    /// Build the child command line: program plus arguments ending with the
    /// payload file path.
    fn build_command(&self, task_file: &Path) -> Result<Vec<String>> {
        let mut args = match &self.command_override {
            Some(command) => shell_words::split(command).map_err(|e| {
                ConductorError::SpawnError(format!(
                    "failed to parse runner command '{}': {}\n\
                     Fix: check for unmatched quotes or invalid escape sequences.",
                    command, e
                ))
            })?,
            None => {
                let exe = std::env::current_exe().map_err(|e| {
                    ConductorError::SpawnError(format!(
                        "failed to locate the current executable: {}",
                        e
                    ))
                })?;
                vec![exe.to_string_lossy().into_owned(), "agent-runner".to_string()]
            }
        };

        if args.is_empty() {
            return Err(ConductorError::SpawnError(
                "runner command is empty after parsing".to_string(),
            ));
        }

        args.push(task_file.to_string_lossy().into_owned());
        Ok(args)
    }

    /// Run the payload synchronously with a timeout.
    pub fn run_agent(&self, payload: &TaskPayload, timeout: Duration) -> Result<RunOutcome> {
        let task_file = self.write_payload(payload)?;
        let args = self.build_command(&task_file)?;

        let (stdout_file, stdout_path) = capture_file(&self.task_dir)?;
        let (stderr_file, stderr_path) = capture_file(&self.task_dir)?;

        let mut command = std::process::Command::new(&args[0]);
        command
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));
        self.apply_environment(&mut command);

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            ConductorError::SpawnError(format!(
                "failed to execute runner command '{}': {}\n\
                 Fix: ensure the command is installed and in PATH.",
                args[0], e
            ))
        })?;

        let (exit_code, timed_out) = wait_with_timeout(&mut child, timeout)?;
        let duration = start.elapsed();

        Ok(self.collect_outcome(exit_code, timed_out, duration, &stdout_path, &stderr_path))
    }

    /// Run the payload on the async runtime with a timeout.
    ///
    /// Same contract as [`run_agent`](Self::run_agent) without blocking the
    /// executor while the child runs.
    pub async fn run_agent_async(
        &self,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<RunOutcome> {
        let task_file = self.write_payload(payload)?;
        let args = self.build_command(&task_file)?;

        let (stdout_file, stdout_path) = capture_file(&self.task_dir)?;
        let (stderr_file, stderr_path) = capture_file(&self.task_dir)?;

        let mut command = tokio::process::Command::new(&args[0]);
        command
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true);
        self.apply_environment_async(&mut command);

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            ConductorError::SpawnError(format!(
                "failed to execute runner command '{}': {}\n\
                 Fix: ensure the command is installed and in PATH.",
                args[0], e
            ))
        })?;

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                return Err(ConductorError::SpawnError(format!(
                    "failed to wait for agent subprocess: {}",
                    e
                )));
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out agent subprocess");
                }
                (None, true)
            }
        };
        let duration = start.elapsed();

        Ok(self.collect_outcome(exit_code, timed_out, duration, &stdout_path, &stderr_path))
    }

    /// Environment for the child: framework path and library search path,
    /// so a fresh process can re-locate shared resources on its own.
    fn child_env(&self) -> Vec<(&'static str, PathBuf)> {
        let base = self
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let framework = framework::resolve_framework_path(&base);
        let lib = framework.join("lib");
        vec![
            (framework::FRAMEWORK_PATH_ENV, framework),
            (framework::LIB_PATH_ENV, lib),
        ]
    }

    fn apply_environment(&self, command: &mut std::process::Command) {
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in self.child_env() {
            command.env(key, value);
        }
    }

    fn apply_environment_async(&self, command: &mut tokio::process::Command) {
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in self.child_env() {
            command.env(key, value);
        }
    }

    fn collect_outcome(
        &self,
        exit_code: Option<i32>,
        timed_out: bool,
        duration: Duration,
        stdout_path: &Path,
        stderr_path: &Path,
    ) -> RunOutcome {
        let stdout = read_capture(stdout_path);
        let mut stderr = read_capture(stderr_path);
        stderr = truncate_tail(&stderr, self.max_stderr_len);

        RunOutcome {
            exit_code,
            timed_out,
            stdout,
            stderr,
            duration,
        }
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a self-deleting capture file and a handle to its path.
fn capture_file(dir: &Path) -> Result<(File, PathBuf)> {
    let file = tempfile::Builder::new()
        .prefix("conductor-io-")
        .tempfile_in(dir)
        .map_err(|e| {
            ConductorError::SpawnError(format!(
                "failed to create output capture file in '{}': {}",
                dir.display(),
                e
            ))
        })?;

    let path = file.path().to_path_buf();
    let (handle, temp_path) = file.into_parts();
    // Disarm auto-delete; read_capture removes the file after reading it.
    let _ = temp_path.keep().map_err(|e| {
        ConductorError::SpawnError(format!("failed to persist output capture file: {}", e))
    })?;

    Ok((handle, path))
}

fn read_capture(path: &Path) -> String {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "failed to remove capture file");
    }
    content
}

/// Keep the last `max_len` bytes of `text`, marking the cut.
fn truncate_tail(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut start = text.len() - max_len;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Wait for a child process with timeout, polling at a fixed interval.
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<(Option<i32>, bool)> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((status.code(), false)),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok((None, true));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(ConductorError::SpawnError(format!(
                    "failed to check agent subprocess status: {}",
                    e
                )));
            }
        }
    }
}

/// Remove task payload files older than `max_age`. Returns how many were
/// removed. Failures are logged, not propagated; cleanup is best effort.
pub fn sweep_stale_task_files(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to scan task directory");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(TASK_FILE_PREFIX) || !name.ends_with(".json") {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok());

        if let Some(age) = age
            && age >= max_age
        {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to remove stale task file");
                }
            }
        }
    }
    removed
}
