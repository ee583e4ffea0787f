//! Context bundle: the context manager's output.
//!
//! A bundle is ephemeral: created fresh per request (or served from
//! cache), immutable once returned, and never persisted. The caller
//! discards it after use.

use crate::memory::{MemoryCategory, MemoryItem, SecurityLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::scoring::{SUCCESS_TAGS, TEAM_PREFERENCE_TAGS};

/// Filtered, scored, size-bounded set of memories for one delegation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Counter-derived bundle identifier.
    pub context_id: String,

    /// When the bundle was prepared.
    pub prepared_at: DateTime<Utc>,

    /// Included memories per category, highest relevance first.
    pub memories_by_category: BTreeMap<MemoryCategory, Vec<MemoryItem>>,

    /// Relevance score per included memory id.
    pub relevance_scores: BTreeMap<String, f64>,

    /// Fixed-format human-readable digest of bundle contents.
    pub context_summary: String,

    /// Most restrictive security level actually included.
    pub security_level: SecurityLevel,

    /// Team-access label for `security_level`.
    pub team_access_level: String,

    /// Wall-clock cost of preparation.
    pub preparation_time_ms: u64,

    /// Ordered names of the filters applied, for auditability.
    pub context_filters_applied: Vec<String>,

    /// Total items across all categories.
    pub total_memories: usize,
}

impl ContextBundle {
    /// An empty bundle recording why it is degraded.
    ///
    /// Used when retrieval fails or the request is invalid; callers must
    /// tolerate degraded context, so this is returned instead of an error.
    pub fn degraded(context_id: String, filters_applied: Vec<String>) -> Self {
        Self {
            context_id,
            prepared_at: Utc::now(),
            memories_by_category: BTreeMap::new(),
            relevance_scores: BTreeMap::new(),
            context_summary: "no context available".to_string(),
            security_level: SecurityLevel::Public,
            team_access_level: SecurityLevel::Public.team_access_label().to_string(),
            preparation_time_ms: 0,
            context_filters_applied: filters_applied,
            total_memories: 0,
        }
    }

    /// Whether the bundle carries no memories.
    pub fn is_empty(&self) -> bool {
        self.total_memories == 0
    }

    /// Iterate over all included memories across categories.
    pub fn iter_memories(&self) -> impl Iterator<Item = &MemoryItem> {
        self.memories_by_category.values().flatten()
    }

    /// Render the fixed-format context summary.
    ///
    /// Format: per-category counts, the top 1-2 dominant pattern tags,
    /// and team-standard presence, joined with " | ".
    pub fn render_summary(&self) -> String {
        if self.is_empty() {
            return "no context available".to_string();
        }

        let mut parts = Vec::new();

        let counts: Vec<String> = self
            .memories_by_category
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(category, items)| format!("{} {}", items.len(), category))
            .collect();
        parts.push(format!("memories: {}", counts.join(", ")));

        let dominant = self.dominant_pattern_tags(2);
        if !dominant.is_empty() {
            parts.push(format!("key patterns: {}", dominant.join(", ")));
        }

        if self.iter_memories().any(|m| m.has_any_tag(TEAM_PREFERENCE_TAGS)) {
            parts.push("team standards present".to_string());
        }

        parts.join(" | ")
    }

    /// The most frequent success/pattern tags among included memories.
    fn dominant_pattern_tags(&self, limit: usize) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for item in self.iter_memories() {
            for tag in &item.tags {
                if SUCCESS_TAGS.contains(&tag.as_str()) {
                    *counts.entry(tag.as_str()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        // Sort by count descending, tag name as tiebreak for determinism.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(tag, _)| tag.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn item(id: &str, category: MemoryCategory, tags: &[&str]) -> MemoryItem {
        MemoryItem {
            id: id.to_string(),
            content: format!("content of {}", id),
            category,
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            security_level: Default::default(),
            project: None,
            created_at: Utc::now(),
        }
    }

    fn bundle_with(memories: Vec<MemoryItem>) -> ContextBundle {
        let mut by_category: BTreeMap<MemoryCategory, Vec<MemoryItem>> = BTreeMap::new();
        let total = memories.len();
        for memory in memories {
            by_category.entry(memory.category).or_default().push(memory);
        }

        let mut bundle = ContextBundle::degraded("ctx_test".to_string(), vec![]);
        bundle.memories_by_category = by_category;
        bundle.total_memories = total;
        bundle
    }

    #[test]
    fn test_degraded_bundle_is_empty() {
        let bundle =
            ContextBundle::degraded("ctx_1".to_string(), vec!["gateway_error:pattern".to_string()]);

        assert!(bundle.is_empty());
        assert_eq!(bundle.context_summary, "no context available");
        assert_eq!(bundle.context_filters_applied.len(), 1);
        assert_eq!(bundle.security_level, SecurityLevel::Public);
    }

    #[test]
    fn test_summary_includes_category_counts() {
        let bundle = bundle_with(vec![
            item("a", MemoryCategory::Pattern, &[]),
            item("b", MemoryCategory::Pattern, &[]),
            item("c", MemoryCategory::Error, &[]),
        ]);

        let summary = bundle.render_summary();
        assert!(summary.contains("2 pattern"));
        assert!(summary.contains("1 error"));
    }

    #[test]
    fn test_summary_names_dominant_pattern_tags() {
        let bundle = bundle_with(vec![
            item("a", MemoryCategory::Pattern, &["successful"]),
            item("b", MemoryCategory::Pattern, &["successful", "best_practice"]),
            item("c", MemoryCategory::Team, &[]),
        ]);

        let summary = bundle.render_summary();
        assert!(summary.contains("key patterns: successful, best_practice"));
    }

    #[test]
    fn test_summary_notes_team_standards() {
        let bundle = bundle_with(vec![item("a", MemoryCategory::Team, &["team_standard"])]);

        assert!(bundle.render_summary().contains("team standards present"));
    }

    #[test]
    fn test_summary_for_empty_bundle() {
        let bundle = bundle_with(vec![]);
        assert_eq!(bundle.render_summary(), "no context available");
    }

    #[test]
    fn test_bundle_round_trips_through_json() {
        let mut bundle = bundle_with(vec![item("a", MemoryCategory::Pattern, &["successful"])]);
        bundle.relevance_scores.insert("a".to_string(), 1.5);
        bundle.context_summary = bundle.render_summary();

        let json = serde_json::to_string(&bundle).unwrap();
        let back: ContextBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bundle);
    }
}
