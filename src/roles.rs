//! Agent role filter registry.
//!
//! Maps agent types to their context filtering policy: which memory
//! categories to prioritize, which keywords boost relevance, and which
//! tags are excluded from the role's context regardless of score.
//!
//! Known agent types form a closed enum so registry lookup is checked
//! exhaustively; unrecognized role strings become `AgentType::Custom` and
//! resolve to a neutral filter rather than an error, so unknown agent
//! types never block delegation.
//!
//! # Override File Format
//!
//! Built-in policies can be extended or replaced via `roles.yaml`:
//!
//! ```yaml
//! roles:
//!   engineer:
//!     primary_categories: [pattern, team, error]
//!     keywords: [implementation, coding]
//!     excluded_tags: [high_level_design]
//!   release_manager:
//!     primary_categories: [project]
//!     keywords: [release, versioning]
//! ```

use crate::error::{ConductorError, Result};
use crate::memory::MemoryCategory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A role identifier used to select filtering policy.
///
/// The seven known roles are closed variants; anything else is carried
/// verbatim in `Custom` and resolves to the neutral filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    Orchestrator,
    Architect,
    Engineer,
    Qa,
    SecurityEngineer,
    PerformanceEngineer,
    CodeReviewEngineer,
    /// Unknown or user-defined role, carrying the raw key.
    Custom(String),
}

impl AgentType {
    /// The registry key for this role.
    pub fn key(&self) -> &str {
        match self {
            AgentType::Orchestrator => "orchestrator",
            AgentType::Architect => "architect",
            AgentType::Engineer => "engineer",
            AgentType::Qa => "qa",
            AgentType::SecurityEngineer => "security_engineer",
            AgentType::PerformanceEngineer => "performance_engineer",
            AgentType::CodeReviewEngineer => "code_review_engineer",
            AgentType::Custom(key) => key,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for AgentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "orchestrator" => AgentType::Orchestrator,
            "architect" => AgentType::Architect,
            "engineer" => AgentType::Engineer,
            "qa" => AgentType::Qa,
            "security_engineer" => AgentType::SecurityEngineer,
            "performance_engineer" => AgentType::PerformanceEngineer,
            "code_review_engineer" => AgentType::CodeReviewEngineer,
            other => AgentType::Custom(other.to_string()),
        })
    }
}

impl From<String> for AgentType {
    fn from(s: String) -> Self {
        s.parse().expect("AgentType::from_str is infallible")
    }
}

impl From<AgentType> for String {
    fn from(t: AgentType) -> Self {
        t.key().to_string()
    }
}

/// Per-role context filtering policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRoleFilter {
    /// Categories to prioritize when the request does not name any.
    pub primary_categories: Vec<MemoryCategory>,

    /// Keywords that boost relevance for this role.
    pub keywords: Vec<String>,

    /// Tags dropped from this role's context regardless of score.
    pub excluded_tags: BTreeSet<String>,
}

impl AgentRoleFilter {
    /// The neutral filter: all categories eligible, no boosts, no exclusions.
    pub fn neutral() -> Self {
        Self {
            primary_categories: MemoryCategory::ALL.to_vec(),
            keywords: Vec::new(),
            excluded_tags: BTreeSet::new(),
        }
    }

    fn new(
        primary_categories: &[MemoryCategory],
        keywords: &[&str],
        excluded_tags: &[&str],
    ) -> Self {
        Self {
            primary_categories: primary_categories.to_vec(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            excluded_tags: excluded_tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Override file format for role policies (`roles.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOverrides {
    /// Role policies keyed by agent-type key.
    pub roles: BTreeMap<String, AgentRoleFilter>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RoleOverrides {
    /// Load overrides from a YAML file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::UserError(format!(
                "failed to read role overrides '{}': {}",
                path.display(),
                e
            ))
        })?;

        let overrides = Self::from_yaml(&content)?;
        Ok(Some(overrides))
    }

    /// Parse overrides from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: RoleOverrides = serde_yaml::from_str(yaml)
            .map_err(|e| ConductorError::UserError(format!("failed to parse roles.yaml: {}", e)))?;

        overrides.validate()?;
        Ok(overrides)
    }

    /// Validate the overrides.
    ///
    /// Validation rules:
    /// - Role keys must not be empty
    /// - Each role must list at least one primary category
    pub fn validate(&self) -> Result<()> {
        for (key, filter) in &self.roles {
            if key.is_empty() {
                return Err(ConductorError::UserError(
                    "roles.yaml validation failed: role key cannot be empty".to_string(),
                ));
            }

            if filter.primary_categories.is_empty() {
                return Err(ConductorError::UserError(format!(
                    "roles.yaml validation failed: role '{}' has no primary_categories",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// Static policy table mapping agent types to role filters.
pub struct RoleFilterRegistry {
    filters: BTreeMap<String, AgentRoleFilter>,
    neutral: AgentRoleFilter,
}

impl RoleFilterRegistry {
    /// Registry with the built-in policy table.
    pub fn builtin() -> Self {
        let mut filters = BTreeMap::new();

        filters.insert(
            "orchestrator".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Project, MemoryCategory::Pattern],
                &["coordination", "planning", "workflow", "orchestration"],
                &["implementation_detail"],
            ),
        );
        filters.insert(
            "architect".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Project, MemoryCategory::Pattern],
                &["architecture", "design", "patterns", "scalability", "decisions"],
                &["minor_bug", "style_issue"],
            ),
        );
        filters.insert(
            "engineer".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Pattern, MemoryCategory::Team, MemoryCategory::Error],
                &["implementation", "coding", "features", "development"],
                &["high_level_design"],
            ),
        );
        filters.insert(
            "qa".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Error, MemoryCategory::Pattern, MemoryCategory::Team],
                &["testing", "quality", "bugs", "validation"],
                &["architecture_decision"],
            ),
        );
        filters.insert(
            "security_engineer".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Error, MemoryCategory::Pattern],
                &["security", "vulnerabilities", "authentication", "authorization"],
                &["performance_issue", "style_issue"],
            ),
        );
        filters.insert(
            "performance_engineer".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Pattern, MemoryCategory::Error],
                &["performance", "optimization", "bottlenecks", "scalability"],
                &["security_issue", "style_issue"],
            ),
        );
        filters.insert(
            "code_review_engineer".to_string(),
            AgentRoleFilter::new(
                &[MemoryCategory::Pattern, MemoryCategory::Team, MemoryCategory::Error],
                &["code_review", "style", "standards", "quality", "best_practices"],
                &["implementation_detail"],
            ),
        );

        Self {
            filters,
            neutral: AgentRoleFilter::neutral(),
        }
    }

    /// Registry with built-ins merged with the given overrides.
    ///
    /// Overrides replace the built-in entry for the same key and may add
    /// entries for custom roles.
    pub fn with_overrides(overrides: RoleOverrides) -> Self {
        let mut registry = Self::builtin();
        for (key, filter) in overrides.roles {
            registry.filters.insert(key, filter);
        }
        registry
    }

    /// Resolve the filter for an agent type.
    ///
    /// Never fails: known roles hit the policy table, and roles without an
    /// entry (including `Custom` keys with no override) get the neutral
    /// filter.
    pub fn resolve(&self, agent_type: &AgentType) -> &AgentRoleFilter {
        self.filters.get(agent_type.key()).unwrap_or(&self.neutral)
    }

    /// The neutral filter used when no agent type is given.
    pub fn neutral(&self) -> &AgentRoleFilter {
        &self.neutral
    }

    /// Number of roles with explicit policies.
    pub fn role_count(&self) -> usize {
        self.filters.len()
    }
}

impl Default for RoleFilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_round_trips_through_str() {
        for key in [
            "orchestrator",
            "architect",
            "engineer",
            "qa",
            "security_engineer",
            "performance_engineer",
            "code_review_engineer",
        ] {
            let agent_type: AgentType = key.parse().unwrap();
            assert!(!matches!(agent_type, AgentType::Custom(_)));
            assert_eq!(agent_type.to_string(), key);
        }
    }

    #[test]
    fn test_unknown_role_becomes_custom() {
        let agent_type: AgentType = "release_manager".parse().unwrap();
        assert_eq!(agent_type, AgentType::Custom("release_manager".to_string()));
        assert_eq!(agent_type.key(), "release_manager");
    }

    #[test]
    fn test_builtin_registry_covers_known_roles() {
        let registry = RoleFilterRegistry::builtin();
        assert_eq!(registry.role_count(), 7);

        let architect = registry.resolve(&AgentType::Architect);
        assert!(architect.excluded_tags.contains("minor_bug"));
        assert!(architect.excluded_tags.contains("style_issue"));
        assert_eq!(
            architect.primary_categories,
            vec![MemoryCategory::Project, MemoryCategory::Pattern]
        );
    }

    #[test]
    fn test_unknown_role_resolves_to_neutral() {
        let registry = RoleFilterRegistry::builtin();
        let filter = registry.resolve(&AgentType::Custom("release_manager".to_string()));

        assert_eq!(filter, &AgentRoleFilter::neutral());
        assert!(filter.excluded_tags.is_empty());
        assert_eq!(filter.primary_categories.len(), 4);
    }

    #[test]
    fn test_qa_role_boosts_testing_keywords() {
        let registry = RoleFilterRegistry::builtin();
        let qa = registry.resolve(&AgentType::Qa);
        assert!(qa.keywords.contains(&"testing".to_string()));
        assert!(qa.primary_categories.starts_with(&[MemoryCategory::Error]));
    }

    #[test]
    fn test_overrides_replace_builtin_entries() {
        let yaml = r#"
roles:
  engineer:
    primary_categories: [pattern]
    keywords: [rust]
  release_manager:
    primary_categories: [project]
    keywords: [release]
    excluded_tags: [minor_bug]
"#;
        let overrides = RoleOverrides::from_yaml(yaml).unwrap();
        let registry = RoleFilterRegistry::with_overrides(overrides);

        let engineer = registry.resolve(&AgentType::Engineer);
        assert_eq!(engineer.primary_categories, vec![MemoryCategory::Pattern]);
        assert_eq!(engineer.keywords, vec!["rust"]);

        let custom = registry.resolve(&AgentType::Custom("release_manager".to_string()));
        assert!(custom.excluded_tags.contains("minor_bug"));
    }

    #[test]
    fn test_overrides_without_categories_fail_validation() {
        let yaml = r#"
roles:
  broken:
    keywords: [something]
"#;
        let result = RoleOverrides::from_yaml(yaml);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("no primary_categories")
        );
    }

    #[test]
    fn test_missing_overrides_file_is_none() {
        let result = RoleOverrides::load("/nonexistent/roles.yaml").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_agent_type_serializes_as_string() {
        let json = serde_json::to_string(&AgentType::SecurityEngineer).unwrap();
        assert_eq!(json, "\"security_engineer\"");

        let parsed: AgentType = serde_json::from_str("\"release_manager\"").unwrap();
        assert_eq!(parsed, AgentType::Custom("release_manager".to_string()));
    }
}
