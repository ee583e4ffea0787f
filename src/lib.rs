//! Conductor: context-aware delegation orchestrator for agent subprocesses.
//!
//! Conductor prepares filtered, role-specific context bundles for delegated
//! agent tasks and runs those tasks in supervised child processes:
//!
//! - [`context`]: relevance-scored retrieval of memories into bounded
//!   bundles, with caching and request coalescing
//! - [`detect`]: marker-file based orchestration mode detection
//! - [`runner`]: payload-file handoff and subprocess supervision
//! - [`orchestrator`]: the delegation pipeline tying the above together
//!
//! Memories live in an external store reached through the
//! [`memory::MemoryGateway`] trait; conductor itself never persists them.

pub mod cli;
pub mod config;
pub mod context;
pub mod detect;
pub mod error;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod roles;
pub mod runner;

#[cfg(test)]
pub mod test_support;

pub use context::{ContextBundle, ContextManager, ContextRequest};
pub use detect::{OrchestrationDecision, OrchestrationDetector, OrchestrationMode};
pub use error::{ConductorError, Result};
pub use memory::{MemoryCategory, MemoryGateway, MemoryItem, SecurityLevel};
pub use orchestrator::{DelegationResult, ExecutionPath, Orchestrator};
pub use roles::AgentType;
