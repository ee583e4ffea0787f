//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definitions. Dispatch
//! returns the process exit code so `main` stays a thin shell.

use crate::config::{CONFIG_FILE, ConductorConfig};
use crate::context::ContextManager;
use crate::detect::OrchestrationDetector;
use crate::error::{ConductorError, Result, exit_codes};
use crate::memory::{NullGateway, SecurityLevel};
use crate::orchestrator::Orchestrator;
use crate::roles::{AgentType, RoleFilterRegistry, RoleOverrides};
use crate::runner::{SubprocessRunner, child};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Conductor: context-aware delegation orchestrator for agent subprocesses.
///
/// Delegated tasks run in child processes that receive a filtered,
/// role-specific context bundle through a single-use payload file.
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for conductor.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Delegate a task to an agent role.
    ///
    /// Detects the orchestration mode, prepares a context bundle for the
    /// role, runs the task in an agent subprocess (or on the fallback path
    /// when delegation is disabled), and prints the result as JSON.
    Delegate(DelegateArgs),

    /// Show the detected orchestration mode and where it came from.
    Mode,

    /// Execute one task payload as an agent child process.
    ///
    /// Used internally: the parent re-invokes this binary with this
    /// command and the payload file path.
    #[command(hide = true)]
    AgentRunner(AgentRunnerArgs),
}

/// Arguments for the `delegate` command.
#[derive(Parser, Debug)]
pub struct DelegateArgs {
    /// Agent role to delegate to (engineer, qa, architect, ...).
    #[arg(long, short)]
    pub agent: String,

    /// The task to delegate.
    pub task: String,

    /// Caller access level (public, team_only, sensitive, confidential).
    #[arg(long, default_value = "public")]
    pub access: String,

    /// Configuration file path.
    #[arg(long, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Override the configured task timeout, in seconds.
    #[arg(long)]
    pub timeout_seconds: Option<u64>,
}

/// Arguments for the internal `agent-runner` command.
#[derive(Parser, Debug)]
pub struct AgentRunnerArgs {
    /// Path to the task payload file.
    pub task_file: PathBuf,
}

/// Execute a command, returning the process exit code.
pub fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Delegate(args) => delegate(args),
        Command::Mode => mode(),
        Command::AgentRunner(args) => {
            child::run_agent_child(&args.task_file)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn delegate(args: DelegateArgs) -> Result<i32> {
    let config = ConductorConfig::load_or_default(&args.config)?;

    let access: SecurityLevel = args.access.parse().map_err(|e| {
        ConductorError::UserError(format!(
            "invalid --access value: {}\n\
             Fix: use one of public, team_only, sensitive, confidential.",
            e
        ))
    })?;

    let agent_type = AgentType::from(args.agent.clone());

    let registry = match &config.roles_file {
        Some(path) => match RoleOverrides::load(path)? {
            Some(overrides) => RoleFilterRegistry::with_overrides(overrides),
            None => {
                return Err(ConductorError::UserError(format!(
                    "roles file '{}' not found\n\
                     Fix: create the file or remove roles_file from conductor.yaml.",
                    path.display()
                )));
            }
        },
        None => RoleFilterRegistry::builtin(),
    };

    let context_manager = ContextManager::new(Arc::new(NullGateway))
        .with_registry(registry)
        .with_weights(config.scoring.clone())
        .with_cache_ttl(config.cache_ttl());

    let mut runner = SubprocessRunner::new().with_max_stderr_len(config.max_stderr_len);
    if let Some(ref command) = config.runner_command {
        runner = runner.with_command(command);
    }

    let timeout = args
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.task_timeout());

    let mut orchestrator = Orchestrator::new(context_manager)
        .with_runner(runner)
        .with_timeout(timeout);
    if let Some(ref path) = config.event_log {
        orchestrator = orchestrator.with_event_log(path);
    }

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        ConductorError::SpawnError(format!("failed to start async runtime: {}", e))
    })?;
    let result = runtime.block_on(orchestrator.delegate(agent_type, &args.task, access));

    let json = serde_json::to_string_pretty(&result).map_err(|e| {
        ConductorError::UserError(format!("failed to serialize delegation result: {}", e))
    })?;
    println!("{}", json);

    if result.success {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::DELEGATION_FAILURE)
    }
}

fn mode() -> Result<i32> {
    let start = std::env::current_dir().map_err(|e| {
        ConductorError::UserError(format!("failed to determine current directory: {}", e))
    })?;

    let decision = OrchestrationDetector::with_default_sources(start).detect();
    println!("{} ({})", decision.mode, decision.source);
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_delegate_command() {
        let cli = Cli::parse_from([
            "conductor",
            "delegate",
            "--agent",
            "engineer",
            "add retry logic",
        ]);

        match cli.command {
            Command::Delegate(args) => {
                assert_eq!(args.agent, "engineer");
                assert_eq!(args.task, "add retry logic");
                assert_eq!(args.access, "public");
                assert_eq!(args.config, PathBuf::from(CONFIG_FILE));
                assert!(args.timeout_seconds.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_agent_runner_command() {
        let cli = Cli::parse_from(["conductor", "agent-runner", "/tmp/task.json"]);

        match cli.command {
            Command::AgentRunner(args) => {
                assert_eq!(args.task_file, PathBuf::from("/tmp/task.json"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_mode_command() {
        let cli = Cli::parse_from(["conductor", "mode"]);
        assert!(matches!(cli.command, Command::Mode));
    }

    #[test]
    fn test_delegate_rejects_unknown_access_level() {
        let args = DelegateArgs {
            agent: "engineer".to_string(),
            task: "x".to_string(),
            access: "cosmic".to_string(),
            config: PathBuf::from("/nonexistent/conductor.yaml"),
            timeout_seconds: None,
        };

        let err = delegate(args).unwrap_err();
        assert!(err.to_string().contains("invalid --access"));
    }

    #[test]
    fn test_missing_roles_file_is_a_user_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&config_path, "roles_file: /nonexistent/roles.yaml\n").unwrap();

        let args = DelegateArgs {
            agent: "engineer".to_string(),
            task: "x".to_string(),
            access: "public".to_string(),
            config: config_path,
            timeout_seconds: None,
        };

        let err = delegate(args).unwrap_err();
        assert!(err.to_string().contains("roles file"));
    }
}
