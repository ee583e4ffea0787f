//! Memory store data model and query gateway interface.
//!
//! Conductor never owns memories; it reads them from an external store
//! through the narrow [`MemoryGateway`] trait. Items carry a category,
//! free-form tags, and an ordinal security level that gates which callers
//! may see them.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Categories under which memories are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Project-level decisions and history.
    Project,
    /// Reusable implementation and design patterns.
    Pattern,
    /// Team standards and preferences.
    Team,
    /// Historical errors and their resolutions.
    Error,
}

impl MemoryCategory {
    /// All categories, in canonical order.
    pub const ALL: [MemoryCategory; 4] = [
        MemoryCategory::Project,
        MemoryCategory::Pattern,
        MemoryCategory::Team,
        MemoryCategory::Error,
    ];
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryCategory::Project => write!(f, "project"),
            MemoryCategory::Pattern => write!(f, "pattern"),
            MemoryCategory::Team => write!(f, "team"),
            MemoryCategory::Error => write!(f, "error"),
        }
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "project" => Ok(MemoryCategory::Project),
            "pattern" => Ok(MemoryCategory::Pattern),
            "team" => Ok(MemoryCategory::Team),
            "error" => Ok(MemoryCategory::Error),
            other => Err(format!("unknown memory category '{}'", other)),
        }
    }
}

/// Ordinal access-control level on a memory item.
///
/// An item is visible to a caller when `item.security_level <= caller_access`.
/// The derived `Ord` follows declaration order, so `Public` is the least
/// restrictive and `Confidential` the most.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Visible to everyone.
    #[default]
    Public,
    /// Visible to team members only.
    TeamOnly,
    /// Visible to the senior team.
    Sensitive,
    /// Visible to leads only.
    Confidential,
}

impl SecurityLevel {
    /// The team-access label the original access table associates with
    /// this level.
    pub fn team_access_label(&self) -> &'static str {
        match self {
            SecurityLevel::Public => "all",
            SecurityLevel::TeamOnly => "team_members",
            SecurityLevel::Sensitive => "senior_team",
            SecurityLevel::Confidential => "leads_only",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLevel::Public => write!(f, "public"),
            SecurityLevel::TeamOnly => write!(f, "team_only"),
            SecurityLevel::Sensitive => write!(f, "sensitive"),
            SecurityLevel::Confidential => write!(f, "confidential"),
        }
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "public" => Ok(SecurityLevel::Public),
            "team_only" => Ok(SecurityLevel::TeamOnly),
            "sensitive" => Ok(SecurityLevel::Sensitive),
            "confidential" => Ok(SecurityLevel::Confidential),
            other => Err(format!("unknown security level '{}'", other)),
        }
    }
}

/// A stored, tagged fact or pattern from prior project work.
///
/// Owned by the external memory store; read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Stable identifier assigned by the store.
    pub id: String,

    /// Memory content text.
    pub content: String,

    /// Category this memory is filed under.
    pub category: MemoryCategory,

    /// Free-form tags (team_standard, successful, anti_pattern, ...).
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Access-control level.
    #[serde(default)]
    pub security_level: SecurityLevel,

    /// Project this memory belongs to, if project-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// When the memory was stored.
    pub created_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Check whether any of the given tags is present on this item.
    pub fn has_any_tag<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter().any(|t| self.tags.contains(t.as_ref()))
    }
}

/// Narrow query interface onto the external memory store.
///
/// One `search` call covers one category; the context manager issues the
/// per-category calls concurrently and tolerates individual failures, so
/// implementations should fail per call rather than poisoning shared state.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Search one category for memories matching the given query terms.
    ///
    /// `project_scope` restricts results to a single project when set.
    /// Implementations return at most `limit` items.
    async fn search(
        &self,
        category: MemoryCategory,
        query_terms: &[String],
        project_scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryItem>>;
}

/// Gateway used when no memory store is configured.
///
/// Always returns an empty result set, which the context manager turns
/// into a degraded (empty) bundle.
#[derive(Debug, Default)]
pub struct NullGateway;

#[async_trait]
impl MemoryGateway for NullGateway {
    async fn search(
        &self,
        _category: MemoryCategory,
        _query_terms: &[String],
        _project_scope: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        Ok(Vec::new())
    }
}
