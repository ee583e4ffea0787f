//! Delegation orchestrator.
//!
//! One entry point, [`Orchestrator::delegate`], coordinates the whole
//! pipeline: detect the orchestration mode, prepare a context bundle for
//! the role, hand the task to an agent subprocess (or the fallback path
//! when delegation is disabled), and normalize whatever happened into a
//! [`DelegationResult`].
//!
//! Nothing here returns `Err` or panics across the delegation boundary:
//! spawn failures, timeouts, and non-zero exits all become a result with
//! `success == false` and a populated `error`, so a caller driving many
//! delegations never has to unwind.

use crate::context::{ContextManager, ContextRequest};
use crate::detect::OrchestrationDetector;
use crate::events::{Event, EventAction, append_event};
use crate::memory::SecurityLevel;
use crate::roles::AgentType;
use crate::runner::{SubprocessRunner, TaskPayload, child};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default cap on one delegated task's execution time.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// How a delegated task was actually executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Ran in an agent subprocess.
    Subprocess,
    /// Delegation disabled; handled on the fallback path.
    Fallback,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Subprocess => write!(f, "subprocess"),
            ExecutionPath::Fallback => write!(f, "fallback"),
        }
    }
}

/// Why a delegation failed. Each reason stays distinguishable in the
/// result's error text.
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("failed to spawn agent subprocess: {0}")]
    SpawnFailed(String),

    #[error("agent subprocess timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("agent subprocess exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
}

/// Normalized outcome of one delegation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResult {
    /// Identifier assigned to this delegation.
    pub task_id: String,

    /// Role the task was delegated to.
    pub agent_type: AgentType,

    /// Whether the task completed successfully.
    pub success: bool,

    /// The agent's output (or the fallback path's structured report).
    pub output: String,

    /// Failure description when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Which path executed the task.
    pub executed_via: ExecutionPath,

    /// Where the mode decision came from.
    pub mode_source: String,

    /// Identifier of the context bundle prepared for the task.
    pub context_id: String,

    /// End-to-end wall-clock time for the delegation.
    pub elapsed_ms: u64,
}

/// Coordinates mode detection, context preparation, and task execution.
pub struct Orchestrator {
    context_manager: ContextManager,
    detector: OrchestrationDetector,
    runner: SubprocessRunner,
    timeout: Duration,
    event_log: Option<PathBuf>,
    task_sequence: AtomicU64,
}

impl Orchestrator {
    /// Orchestrator detecting against the current directory's surroundings,
    /// running the default self-invoking runner with the default timeout.
    pub fn new(context_manager: ContextManager) -> Self {
        let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            context_manager,
            detector: OrchestrationDetector::with_default_sources(start),
            runner: SubprocessRunner::new(),
            timeout: DEFAULT_TASK_TIMEOUT,
            event_log: None,
            task_sequence: AtomicU64::new(0),
        }
    }

    /// Replace the mode detector.
    pub fn with_detector(mut self, detector: OrchestrationDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the subprocess runner.
    pub fn with_runner(mut self, runner: SubprocessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Set the per-task execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append audit events to the NDJSON log at `path`.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    /// Delegate one task to an agent role.
    ///
    /// The mode is detected fresh on every call, so marker edits take
    /// effect between delegations without restarting the process.
    pub async fn delegate(
        &self,
        agent_type: AgentType,
        task_description: &str,
        access: SecurityLevel,
    ) -> DelegationResult {
        let start = Instant::now();
        let task_id = format!("task_{}", self.task_sequence.fetch_add(1, Ordering::Relaxed) + 1);

        let decision = self.detector.detect();
        info!(
            task_id = %task_id,
            agent = %agent_type,
            mode = %decision.mode,
            source = %decision.source,
            "delegating task"
        );
        self.log_event(
            Event::new(EventAction::Delegate)
                .with_agent(agent_type.key())
                .with_details(json!({
                    "task_id": task_id,
                    "mode": decision.mode.to_string(),
                    "mode_source": decision.source,
                })),
        );

        let request = ContextRequest::agent_task(agent_type.clone(), task_description);
        let bundle = self.context_manager.prepare_context(&request, access).await;
        self.log_event(
            Event::new(EventAction::ContextPrepared)
                .with_agent(agent_type.key())
                .with_details(json!({
                    "task_id": task_id,
                    "context_id": bundle.context_id,
                    "memories": bundle.total_memories,
                    "preparation_ms": bundle.preparation_time_ms,
                })),
        );

        let context_id = bundle.context_id.clone();

        let result = if decision.mode.delegates() {
            let payload = TaskPayload::new(
                task_id.clone(),
                agent_type.clone(),
                task_description,
                Some(bundle),
            );
            self.run_subprocess(&task_id, &agent_type, payload).await
        } else {
            self.run_fallback(&task_id, &agent_type, task_description, &bundle.context_summary)
        };

        let (success, output, error, executed_via) = result;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        // The fallback branch already logged FallbackExecution; completion
        // events are only meaningful when a subprocess actually ran.
        if executed_via == ExecutionPath::Subprocess {
            self.log_event(
                Event::new(EventAction::SubprocessComplete)
                    .with_agent(agent_type.key())
                    .with_details(json!({
                        "task_id": task_id,
                        "success": success,
                        "elapsed_ms": elapsed_ms,
                    })),
            );
        }

        DelegationResult {
            task_id,
            agent_type,
            success,
            output,
            error,
            executed_via,
            mode_source: decision.source,
            context_id,
            elapsed_ms,
        }
    }

    async fn run_subprocess(
        &self,
        task_id: &str,
        agent_type: &AgentType,
        payload: TaskPayload,
    ) -> (bool, String, Option<String>, ExecutionPath) {
        self.log_event(
            Event::new(EventAction::SubprocessStart)
                .with_agent(agent_type.key())
                .with_details(json!({"task_id": task_id})),
        );

        let outcome = match self.runner.run_agent_async(&payload, self.timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = DelegationError::SpawnFailed(e.to_string());
                warn!(task_id = %task_id, error = %err, "delegation failed");
                return (false, String::new(), Some(err.to_string()), ExecutionPath::Subprocess);
            }
        };

        if outcome.timed_out {
            let err = DelegationError::Timeout {
                seconds: self.timeout.as_secs(),
            };
            warn!(task_id = %task_id, error = %err, "delegation failed");
            self.log_event(
                Event::new(EventAction::Timeout)
                    .with_agent(agent_type.key())
                    .with_details(json!({
                        "task_id": task_id,
                        "timeout_seconds": self.timeout.as_secs(),
                    })),
            );
            return (false, outcome.stdout, Some(err.to_string()), ExecutionPath::Subprocess);
        }

        match outcome.exit_code {
            Some(0) => {
                // Runners following the contract print a structured result
                // as their final line; anything else is taken verbatim.
                let output = match child::parse_final_result(&outcome.stdout) {
                    Ok(result) => result.output,
                    Err(_) => outcome.stdout.trim_end().to_string(),
                };
                (true, output, None, ExecutionPath::Subprocess)
            }
            code => {
                let err = DelegationError::NonZeroExit {
                    code: code.unwrap_or(-1),
                    stderr: outcome.stderr.clone(),
                };
                warn!(task_id = %task_id, error = %err, "delegation failed");
                (false, outcome.stdout, Some(err.to_string()), ExecutionPath::Subprocess)
            }
        }
    }

    fn run_fallback(
        &self,
        task_id: &str,
        agent_type: &AgentType,
        task_description: &str,
        context_summary: &str,
    ) -> (bool, String, Option<String>, ExecutionPath) {
        let output = format!(
            "delegation disabled; would delegate to {}\ntask: {}\ncontext: {}",
            agent_type, task_description, context_summary
        );

        self.log_event(
            Event::new(EventAction::FallbackExecution)
                .with_agent(agent_type.key())
                .with_details(json!({"task_id": task_id})),
        );

        (true, output, None, ExecutionPath::Fallback)
    }

    /// Append an audit event when a log is configured. Audit failures are
    /// logged and swallowed; they must not fail the delegation itself.
    fn log_event(&self, event: Event) {
        if let Some(ref path) = self.event_log
            && let Err(e) = append_event(path, &event)
        {
            warn!(path = %path.display(), error = %e, "failed to append audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{FileMarkerSource, MARKER_FILE, MarkerSource};
    use crate::events::read_events;
    use crate::memory::MemoryCategory;
    use crate::test_support::{StaticGateway, memory};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context_manager() -> ContextManager {
        ContextManager::new(Arc::new(StaticGateway::with_memories(vec![memory(
            "m1",
            MemoryCategory::Pattern,
            "retry with backoff",
        )])))
    }

    fn enabled_detector() -> OrchestrationDetector {
        OrchestrationDetector::new(vec![])
    }

    fn disabled_detector(dir: &TempDir) -> OrchestrationDetector {
        std::fs::write(dir.path().join(MARKER_FILE), "ORCHESTRATION: DISABLED\n").unwrap();
        let source: Box<dyn MarkerSource> = Box::new(FileMarkerSource::new(
            "project",
            dir.path().join(MARKER_FILE),
        ));
        OrchestrationDetector::new(vec![source])
    }

    fn runner(dir: &TempDir, command: &str) -> SubprocessRunner {
        SubprocessRunner::new()
            .with_task_dir(dir.path())
            .with_command(command)
    }

    #[tokio::test]
    async fn test_successful_subprocess_delegation() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(enabled_detector())
            .with_runner(runner(&dir, "echo agent-output"));

        let result = orchestrator
            .delegate(AgentType::Engineer, "add retry logic", SecurityLevel::Public)
            .await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.executed_via, ExecutionPath::Subprocess);
        assert!(result.output.contains("agent-output"));
        assert_eq!(result.task_id, "task_1");
        assert!(!result.context_id.is_empty());
    }

    #[tokio::test]
    async fn test_structured_child_output_is_unwrapped() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho progress\necho '{\"success\":true,\"task_id\":\"t\",\"output\":\"structured report\"}'\n",
        )
        .unwrap();

        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(enabled_detector())
            .with_runner(runner(&dir, &format!("sh {}", script.display())));

        let result = orchestrator
            .delegate(AgentType::Qa, "verify fix", SecurityLevel::Public)
            .await;

        assert!(result.success);
        assert_eq!(result.output, "structured report");
    }

    #[tokio::test]
    async fn test_disabled_mode_takes_fallback_path() {
        let marker_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(disabled_detector(&marker_dir));

        let result = orchestrator
            .delegate(AgentType::Architect, "sketch design", SecurityLevel::Public)
            .await;

        assert!(result.success);
        assert_eq!(result.executed_via, ExecutionPath::Fallback);
        assert!(result.output.contains("would delegate to architect"));
        assert!(result.output.contains("sketch design"));
        assert!(result.mode_source.contains("explicit disable marker"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_a_failed_result_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(enabled_detector())
            .with_runner(runner(&dir, "nonexistent_command_xyz_123"));

        let result = orchestrator
            .delegate(AgentType::Engineer, "task", SecurityLevel::Public)
            .await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("failed to spawn agent subprocess"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_distinctly() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(enabled_detector())
            .with_runner(runner(&dir, "sh -c \"sleep 10\""))
            .with_timeout(Duration::from_millis(200));

        let result = orchestrator
            .delegate(AgentType::Engineer, "task", SecurityLevel::Public)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(enabled_detector())
            .with_runner(runner(&dir, "sh -c \"echo boom >&2; exit 3\""));

        let result = orchestrator
            .delegate(AgentType::Engineer, "task", SecurityLevel::Public)
            .await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("code 3"));
        assert!(error.contains("boom"));
    }

    #[tokio::test]
    async fn test_task_ids_are_sequential() {
        let marker_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(disabled_detector(&marker_dir));

        let first = orchestrator
            .delegate(AgentType::Qa, "a", SecurityLevel::Public)
            .await;
        let second = orchestrator
            .delegate(AgentType::Qa, "b", SecurityLevel::Public)
            .await;

        assert_eq!(first.task_id, "task_1");
        assert_eq!(second.task_id, "task_2");
    }

    #[tokio::test]
    async fn test_audit_events_are_appended_when_configured() {
        let marker_dir = TempDir::new().unwrap();
        let log_dir = TempDir::new().unwrap();
        let log_path = log_dir.path().join("events.ndjson");

        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(disabled_detector(&marker_dir))
            .with_event_log(&log_path);

        orchestrator
            .delegate(AgentType::Engineer, "task", SecurityLevel::Public)
            .await;

        let events = read_events(&log_path).unwrap();
        let actions: Vec<EventAction> = events.iter().map(|e| e.action).collect();
        assert!(actions.contains(&EventAction::Delegate));
        assert!(actions.contains(&EventAction::ContextPrepared));
        assert!(actions.contains(&EventAction::FallbackExecution));
        // No subprocess ran, so no subprocess lifecycle events.
        assert!(!actions.contains(&EventAction::SubprocessStart));
        assert!(!actions.contains(&EventAction::SubprocessComplete));
    }

    #[tokio::test]
    async fn test_subprocess_path_logs_start_and_complete_events() {
        let dir = TempDir::new().unwrap();
        let log_dir = TempDir::new().unwrap();
        let log_path = log_dir.path().join("events.ndjson");

        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(enabled_detector())
            .with_runner(runner(&dir, "echo done"))
            .with_event_log(&log_path);

        orchestrator
            .delegate(AgentType::Engineer, "task", SecurityLevel::Public)
            .await;

        let events = read_events(&log_path).unwrap();
        let actions: Vec<EventAction> = events.iter().map(|e| e.action).collect();
        assert!(actions.contains(&EventAction::SubprocessStart));
        assert!(actions.contains(&EventAction::SubprocessComplete));
        assert!(!actions.contains(&EventAction::FallbackExecution));
    }

    #[tokio::test]
    async fn test_delegation_result_serializes_for_downstream_consumers() {
        let marker_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(context_manager())
            .with_detector(disabled_detector(&marker_dir));

        let result = orchestrator
            .delegate(AgentType::Engineer, "task", SecurityLevel::Public)
            .await;

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"executed_via\":\"fallback\""));
        // error is omitted on success
        assert!(!json.contains("\"error\""));
    }
}
