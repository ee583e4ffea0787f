//! Error types for conductor.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Hard failures inside components use these variants; failures that cross the
//! orchestrator boundary are normalized into `DelegationResult` instead (see
//! the `orchestrator` module).

use thiserror::Error;

/// Exit codes for the `conductor` binary.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// User provided invalid arguments or configuration.
    pub const USER_ERROR: i32 = 1;
    /// The delegated task reported failure.
    pub const DELEGATION_FAILURE: i32 = 2;
    /// The agent-runner child could not complete its task.
    pub const CHILD_FAILURE: i32 = 3;
}

/// Main error type for conductor operations.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The memory gateway could not be queried.
    ///
    /// The context manager recovers from this locally; it only escapes
    /// through gateway implementations themselves.
    #[error("memory gateway error: {0}")]
    GatewayError(String),

    /// The subprocess runner could not construct the child environment
    /// or spawn the child process.
    #[error("environment resolution failed: {0}")]
    SpawnError(String),

    /// Reading or writing a task payload file failed.
    #[error("task payload error: {0}")]
    PayloadError(String),
}

impl ConductorError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConductorError::UserError(_) => exit_codes::USER_ERROR,
            ConductorError::GatewayError(_) => exit_codes::DELEGATION_FAILURE,
            ConductorError::SpawnError(_) => exit_codes::DELEGATION_FAILURE,
            ConductorError::PayloadError(_) => exit_codes::CHILD_FAILURE,
        }
    }
}

/// Result type alias for conductor operations.
pub type Result<T> = std::result::Result<T, ConductorError>;
