//! Relevance scoring for candidate memories.
//!
//! Scoring is a weighted sum of independent factors, each clamped to
//! [0, 1] before weighting. The success-pattern and error-prevention
//! weights exceed 1.0 deliberately, so those tags can push a memory past
//! an otherwise perfect textual match. Scores are used for ordering only;
//! no absolute threshold is enforced.
//!
//! The weights have no documented calibration method, so they are carried
//! in configuration with these defaults rather than hard-coded.

use crate::context::request::ContextRequest;
use crate::error::{ConductorError, Result};
use crate::memory::MemoryItem;
use crate::roles::AgentRoleFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lookback window for linear recency decay, in days. Memories older than
/// this score 0 on the recency factor.
pub const RECENCY_LOOKBACK_DAYS: i64 = 365;

/// Tags marking a memory as a proven success pattern.
pub const SUCCESS_TAGS: &[&str] = &["successful", "approved", "high_quality", "best_practice"];

/// Tags marking a memory as a team-preferred approach.
pub const TEAM_PREFERENCE_TAGS: &[&str] = &["team_standard", "preferred_approach", "recommended"];

/// Tags marking a memory as error-prevention knowledge.
pub const ERROR_PREVENTION_TAGS: &[&str] =
    &["error_prone", "requires_attention", "vulnerability", "anti_pattern"];

/// Boost added per matching priority tag.
const PRIORITY_TAG_BOOST: f64 = 0.2;

/// Maximum boost from role keywords found in memory content.
const ROLE_KEYWORD_BOOST: f64 = 0.3;

/// Weights for the relevance-scoring factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Exact phrase match of the task description in memory content.
    pub exact_match: f64,
    /// Keyword overlap ratio (keywords found / keywords requested).
    pub keyword_match: f64,
    /// Memory belongs to the requested project.
    pub project_relevance: f64,
    /// Linear recency decay, newest = 1.0.
    pub recency: f64,
    /// Team-preferred tag present.
    pub team_preference: f64,
    /// Success-pattern tag present (boost, contribution may exceed 1.0).
    pub success_pattern: f64,
    /// Error-prevention tag present.
    pub error_prevention: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_match: 1.0,
            keyword_match: 0.8,
            project_relevance: 0.7,
            recency: 0.5,
            team_preference: 0.9,
            success_pattern: 1.2,
            error_prevention: 1.1,
        }
    }
}

impl ScoringWeights {
    /// Validate that all weights are non-negative.
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("exact_match", self.exact_match),
            ("keyword_match", self.keyword_match),
            ("project_relevance", self.project_relevance),
            ("recency", self.recency),
            ("team_preference", self.team_preference),
            ("success_pattern", self.success_pattern),
            ("error_prevention", self.error_prevention),
        ];

        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConductorError::UserError(format!(
                    "scoring weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Score one candidate memory against a request.
    ///
    /// `now` is passed in so a whole batch is scored against a single
    /// reference time and ordering is reproducible.
    pub fn score(
        &self,
        item: &MemoryItem,
        request: &ContextRequest,
        role_filter: &AgentRoleFilter,
        now: DateTime<Utc>,
    ) -> f64 {
        let content_lower = item.content.to_lowercase();
        let mut score = 0.0;

        // Exact phrase match
        if !request.task_description.is_empty()
            && content_lower.contains(&request.task_description.to_lowercase())
        {
            score += self.exact_match;
        }

        // Keyword overlap ratio
        if !request.keywords.is_empty() {
            let found = request
                .keywords
                .iter()
                .filter(|k| content_lower.contains(&k.to_lowercase()))
                .count();
            let ratio = (found as f64 / request.keywords.len() as f64).clamp(0.0, 1.0);
            score += ratio * self.keyword_match;
        }

        // Project relevance
        if let Some(ref project) = request.project_name
            && item.project.as_deref() == Some(project.as_str())
        {
            score += self.project_relevance;
        }

        // Recency: linear decay over the lookback window
        let age_days = (now - item.created_at).num_days();
        let recency_factor = (1.0 - age_days as f64 / RECENCY_LOOKBACK_DAYS as f64).clamp(0.0, 1.0);
        score += recency_factor * self.recency;

        // Tag-based factors
        if item.has_any_tag(TEAM_PREFERENCE_TAGS) {
            score += self.team_preference;
        }
        if item.has_any_tag(SUCCESS_TAGS) {
            score += self.success_pattern;
        }
        if item.has_any_tag(ERROR_PREVENTION_TAGS) {
            score += self.error_prevention;
        }

        // Priority tags requested by the caller
        let priority_matches = request
            .priority_tags
            .iter()
            .filter(|t| item.tags.contains(t.as_str()))
            .count();
        score += priority_matches as f64 * PRIORITY_TAG_BOOST;

        // Role boost keywords found in content
        if !role_filter.keywords.is_empty() {
            let role_matches = role_filter
                .keywords
                .iter()
                .filter(|k| content_lower.contains(&k.to_lowercase()))
                .count();
            let ratio = (role_matches as f64 / role_filter.keywords.len() as f64).clamp(0.0, 1.0);
            score += ratio * ROLE_KEYWORD_BOOST;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCategory;
    use crate::roles::AgentType;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn item(content: &str) -> MemoryItem {
        MemoryItem {
            id: "mem-1".to_string(),
            content: content.to_string(),
            category: MemoryCategory::Pattern,
            tags: BTreeSet::new(),
            security_level: Default::default(),
            project: None,
            created_at: Utc::now(),
        }
    }

    fn request(description: &str) -> ContextRequest {
        ContextRequest::agent_task(AgentType::Engineer, description)
    }

    #[test]
    fn test_exact_phrase_match_scores_full_weight() {
        let weights = ScoringWeights::default();
        let now = Utc::now();
        let filter = AgentRoleFilter::neutral();

        let matching = item("we should add retry logic to the client");
        let other = item("unrelated note about logging");

        let req = request("retry logic");
        let hit = weights.score(&matching, &req, &filter, now);
        let miss = weights.score(&other, &req, &filter, now);

        assert!(hit > miss);
        assert!(hit - miss >= weights.exact_match - f64::EPSILON);
    }

    #[test]
    fn test_keyword_overlap_is_a_ratio() {
        let weights = ScoringWeights::default();
        let now = Utc::now();
        let filter = AgentRoleFilter::neutral();

        let half = item("covers timeouts only");
        let full = item("covers timeouts and retries");
        let req = request("").with_keywords(["timeouts", "retries"]);

        let half_score = weights.score(&half, &req, &filter, now);
        let full_score = weights.score(&full, &req, &filter, now);

        let diff = full_score - half_score;
        assert!((diff - weights.keyword_match / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_pattern_tag_outweighs_exact_match() {
        let weights = ScoringWeights::default();
        assert!(weights.success_pattern > weights.exact_match);

        let now = Utc::now();
        let filter = AgentRoleFilter::neutral();

        let mut tagged = item("something unrelated");
        tagged.tags.insert("successful".to_string());
        let matched = item("the exact task text");

        let req = request("the exact task text");
        let tagged_score = weights.score(&tagged, &req, &filter, now);
        let matched_score = weights.score(&matched, &req, &filter, now);

        assert!(tagged_score > matched_score);
    }

    #[test]
    fn test_recency_decays_linearly() {
        let weights = ScoringWeights::default();
        let now = Utc::now();
        let filter = AgentRoleFilter::neutral();
        let req = request("");

        let fresh = item("note");
        let mut old = item("note");
        old.created_at = now - Duration::days(RECENCY_LOOKBACK_DAYS / 2);
        let mut ancient = item("note");
        ancient.created_at = now - Duration::days(RECENCY_LOOKBACK_DAYS * 2);

        let fresh_score = weights.score(&fresh, &req, &filter, now);
        let old_score = weights.score(&old, &req, &filter, now);
        let ancient_score = weights.score(&ancient, &req, &filter, now);

        assert!(fresh_score > old_score);
        assert!(old_score > ancient_score);
        // Past the lookback window the recency factor bottoms out at zero.
        assert!(ancient_score.abs() < 1e-9);
    }

    #[test]
    fn test_priority_tags_add_boost_per_match() {
        let weights = ScoringWeights::default();
        let now = Utc::now();
        let filter = AgentRoleFilter::neutral();

        let mut tagged = item("note");
        tagged.tags.insert("migration".to_string());
        tagged.tags.insert("urgent".to_string());
        let plain = item("note");

        let req = request("").with_priority_tags(["migration", "urgent"]);
        let tagged_score = weights.score(&tagged, &req, &filter, now);
        let plain_score = weights.score(&plain, &req, &filter, now);

        assert!((tagged_score - plain_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_role_keywords_in_content_boost_score() {
        let weights = ScoringWeights::default();
        let now = Utc::now();

        let filter = AgentRoleFilter {
            keywords: vec!["testing".to_string(), "quality".to_string()],
            ..AgentRoleFilter::neutral()
        };

        let relevant = item("improve testing and quality gates");
        let other = item("refactor the parser");

        let req = request("");
        let relevant_score = weights.score(&relevant, &req, &filter, now);
        let other_score = weights.score(&other, &req, &filter, now);

        assert!(relevant_score > other_score);
    }

    #[test]
    fn test_negative_weights_fail_validation() {
        let weights = ScoringWeights {
            recency: -0.5,
            ..Default::default()
        };
        let err = weights.validate().unwrap_err();
        assert!(err.to_string().contains("recency"));
    }

    #[test]
    fn test_default_weights_are_valid() {
        assert!(ScoringWeights::default().validate().is_ok());
    }
}
