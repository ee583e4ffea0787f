//! Context request types.
//!
//! A [`ContextRequest`] is the immutable input to context preparation: what
//! kind of context is needed, for which role, scoped to which project, and
//! under what size and recency bounds.

use crate::error::{ConductorError, Result};
use crate::memory::{MemoryCategory, SecurityLevel};
use crate::roles::AgentType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default cap on total memories in a bundle.
pub const DEFAULT_MAX_MEMORIES: usize = 20;

/// Kinds of context that can be prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// Context for a delegated agent task.
    AgentTask,
    /// Context for reviewing changed code.
    CodeReview,
    /// High-level project overview context.
    ProjectOverview,
    /// Context for an architecture decision.
    ArchitectureDecision,
    /// Context for a debugging session.
    DebuggingSession,
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextType::AgentTask => "agent_task",
            ContextType::CodeReview => "code_review",
            ContextType::ProjectOverview => "project_overview",
            ContextType::ArchitectureDecision => "architecture_decision",
            ContextType::DebuggingSession => "debugging_session",
        };
        write!(f, "{}", s)
    }
}

/// Scope of context preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    /// Restricted to one project.
    ProjectSpecific,
    /// Patterns across all projects.
    GlobalPatterns,
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextScope::ProjectSpecific => "project_specific",
            ContextScope::GlobalPatterns => "global_patterns",
        };
        write!(f, "{}", s)
    }
}

/// Immutable input describing what context is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    /// Kind of context to prepare.
    pub context_type: ContextType,

    /// Project-specific or global scope.
    pub scope: ContextScope,

    /// Project to scope retrieval to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Role the context is being prepared for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,

    /// Free-text task description; source of keyword extraction.
    #[serde(default)]
    pub task_description: String,

    /// Explicit keywords to match.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Categories to search; empty means derive from the role filter.
    #[serde(default)]
    pub categories: Vec<MemoryCategory>,

    /// Cap on total items across all categories combined.
    pub max_memories: usize,

    /// Hard recency cutoff in days, applied before scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_days: Option<u32>,

    /// Tags that receive a scoring boost.
    #[serde(default)]
    pub priority_tags: Vec<String>,
}

impl ContextRequest {
    /// Request for a delegated agent task.
    pub fn agent_task(agent_type: AgentType, task_description: impl Into<String>) -> Self {
        Self {
            context_type: ContextType::AgentTask,
            scope: ContextScope::ProjectSpecific,
            project_name: None,
            agent_type: Some(agent_type),
            task_description: task_description.into(),
            keywords: Vec::new(),
            categories: Vec::new(),
            max_memories: DEFAULT_MAX_MEMORIES,
            time_window_days: None,
            priority_tags: Vec::new(),
        }
    }

    /// Request for a code review.
    pub fn code_review(project_name: impl Into<String>) -> Self {
        Self {
            context_type: ContextType::CodeReview,
            scope: ContextScope::ProjectSpecific,
            project_name: Some(project_name.into()),
            agent_type: None,
            task_description: String::new(),
            keywords: vec![
                "code_review".to_string(),
                "quality".to_string(),
                "standards".to_string(),
            ],
            categories: vec![
                MemoryCategory::Pattern,
                MemoryCategory::Team,
                MemoryCategory::Error,
            ],
            max_memories: DEFAULT_MAX_MEMORIES,
            time_window_days: None,
            priority_tags: Vec::new(),
        }
    }

    /// Set the project scope.
    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = Some(project_name.into());
        self
    }

    /// Set explicit keywords.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Set explicit categories to search.
    pub fn with_categories(mut self, categories: Vec<MemoryCategory>) -> Self {
        self.categories = categories;
        self
    }

    /// Set the total memory cap.
    pub fn with_max_memories(mut self, max_memories: usize) -> Self {
        self.max_memories = max_memories;
        self
    }

    /// Set the hard recency cutoff.
    pub fn with_time_window_days(mut self, days: u32) -> Self {
        self.time_window_days = Some(days);
        self
    }

    /// Set priority tags.
    pub fn with_priority_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Validate request invariants.
    ///
    /// `max_memories` must be positive; `time_window_days`, if present,
    /// must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_memories == 0 {
            return Err(ConductorError::UserError(
                "context request validation failed: max_memories must be greater than 0"
                    .to_string(),
            ));
        }

        if let Some(days) = self.time_window_days
            && days == 0
        {
            return Err(ConductorError::UserError(
                "context request validation failed: time_window_days must be greater than 0"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Deterministic cache key for this request under the given access level.
    ///
    /// Built from every field that affects the result, with set-like fields
    /// sorted so insertion order does not change the key.
    pub fn cache_key(&self, access: SecurityLevel) -> String {
        let mut keywords: Vec<&str> = self.keywords.iter().map(String::as_str).collect();
        keywords.sort_unstable();
        keywords.dedup();

        let mut priority_tags: Vec<&str> = self.priority_tags.iter().map(String::as_str).collect();
        priority_tags.sort_unstable();
        priority_tags.dedup();

        let mut categories: Vec<String> = self.categories.iter().map(|c| c.to_string()).collect();
        categories.sort_unstable();
        categories.dedup();

        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.context_type,
            self.scope,
            self.project_name.as_deref().unwrap_or("-"),
            self.agent_type
                .as_ref()
                .map(|a| a.key())
                .unwrap_or("-"),
            self.task_description,
            keywords.join(","),
            categories.join(","),
            self.max_memories,
            self.time_window_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            priority_tags.join(","),
            access,
        )
    }
}
