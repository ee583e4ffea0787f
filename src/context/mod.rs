//! Context preparation subsystem.
//!
//! This module turns a [`ContextRequest`] into a [`ContextBundle`]: it
//! retrieves candidate memories from the gateway per category in parallel,
//! deduplicates them, applies recency/security/role filters, scores the
//! survivors, and truncates to the requested budget.
//!
//! - **Request**: immutable input types (`request`)
//! - **Bundle**: the scored, bounded output (`bundle`)
//! - **Scoring**: configurable weighted-sum relevance model (`scoring`)
//! - **Cache**: TTL cache with concurrent coalescing (`cache`)
//!
//! Preparation never fails: retrieval errors degrade the bundle (recorded
//! in `context_filters_applied`) instead of propagating, so callers always
//! receive a bundle they can act on.

pub mod bundle;
pub mod cache;
pub mod request;
pub mod scoring;

pub use bundle::ContextBundle;
pub use request::{ContextRequest, ContextScope, ContextType};
pub use scoring::ScoringWeights;

use crate::memory::{MemoryCategory, MemoryGateway, MemoryItem, SecurityLevel};
use crate::roles::{AgentRoleFilter, RoleFilterRegistry};
use cache::ContextCache;
use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cap on query terms sent to the gateway per search.
const MAX_QUERY_TERMS: usize = 5;

/// Minimum word length for keywords extracted from the task description.
const MIN_EXTRACTED_WORD_LEN: usize = 4;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]+").expect("static word pattern"))
}

/// Transforms context requests into bounded, role-specific bundles.
pub struct ContextManager {
    gateway: Arc<dyn MemoryGateway>,
    registry: RoleFilterRegistry,
    weights: ScoringWeights,
    cache: ContextCache,
    sequence: AtomicU64,
}

impl ContextManager {
    /// Manager with the built-in role registry, default scoring weights,
    /// and the default cache TTL.
    pub fn new(gateway: Arc<dyn MemoryGateway>) -> Self {
        Self {
            gateway,
            registry: RoleFilterRegistry::builtin(),
            weights: ScoringWeights::default(),
            cache: ContextCache::new(cache::DEFAULT_TTL),
            sequence: AtomicU64::new(0),
        }
    }

    /// Replace the role filter registry.
    pub fn with_registry(mut self, registry: RoleFilterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the scoring weights.
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Replace the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = ContextCache::new(ttl);
        self
    }

    /// Prepare a context bundle for the request under the caller's access
    /// level.
    ///
    /// Served from cache when an identical request was prepared within the
    /// TTL; concurrent identical requests coalesce onto one computation.
    /// Never returns an error: retrieval failures yield a degraded bundle.
    pub async fn prepare_context(
        &self,
        request: &ContextRequest,
        access: SecurityLevel,
    ) -> ContextBundle {
        let key = request.cache_key(access);
        self.cache
            .get_or_prepare(&key, || self.compute(request, access))
            .await
    }

    async fn compute(&self, request: &ContextRequest, access: SecurityLevel) -> ContextBundle {
        let start = Instant::now();
        let context_id = format!("ctx_{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1);

        if let Err(e) = request.validate() {
            warn!(context_id = %context_id, error = %e, "invalid context request");
            return ContextBundle::degraded(context_id, vec!["invalid_request".to_string()]);
        }

        let role_filter = match request.agent_type {
            Some(ref agent_type) => self.registry.resolve(agent_type),
            None => self.registry.neutral(),
        };

        let query_terms = build_query_terms(request, role_filter);
        let categories = search_categories(request, role_filter);
        let project_scope = match request.scope {
            ContextScope::ProjectSpecific => request.project_name.as_deref(),
            ContextScope::GlobalPatterns => None,
        };

        let mut filters_applied = Vec::new();

        // One search per category, issued concurrently. A failing category
        // contributes nothing; the failure is recorded for audit.
        let searches = categories.iter().map(|&category| {
            let query_terms = &query_terms;
            async move {
                let result = self
                    .gateway
                    .search(category, query_terms, project_scope, request.max_memories)
                    .await;
                (category, result)
            }
        });
        let results = futures::future::join_all(searches).await;

        let mut candidates: Vec<MemoryItem> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        for (category, result) in results {
            match result {
                Ok(items) => {
                    for item in items {
                        if seen_ids.insert(item.id.clone()) {
                            candidates.push(item);
                        }
                    }
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "memory gateway query failed");
                    filters_applied.push(format!("gateway_error:{}", category));
                }
            }
        }

        let now = Utc::now();

        // Hard recency cutoff, before scoring.
        if let Some(days) = request.time_window_days {
            let cutoff = now - ChronoDuration::days(i64::from(days));
            candidates.retain(|m| m.created_at >= cutoff);
            filters_applied.push("time_window_filter".to_string());
        }

        // Security filtering against the caller's granted access level.
        candidates.retain(|m| m.security_level <= access);
        filters_applied.push("security_filter".to_string());

        // Role-based tag exclusion.
        if let Some(ref agent_type) = request.agent_type {
            candidates.retain(|m| m.tags.is_disjoint(&role_filter.excluded_tags));
            filters_applied.push(format!("{}_role_boundaries", agent_type.key()));
        }

        // Score and order. Ties break on id so ordering is reproducible.
        let mut scored: Vec<(f64, MemoryItem)> = candidates
            .into_iter()
            .map(|item| {
                let score = self.weights.score(&item, request, role_filter, now);
                (score, item)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        filters_applied.push("relevance_scoring".to_string());

        let selected = select_within_budget(scored, request.max_memories);

        let mut memories_by_category: BTreeMap<MemoryCategory, Vec<MemoryItem>> = BTreeMap::new();
        let mut relevance_scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut max_security = SecurityLevel::Public;
        let total = selected.len();

        for (score, item) in selected {
            max_security = max_security.max(item.security_level);
            relevance_scores.insert(item.id.clone(), score);
            memories_by_category.entry(item.category).or_default().push(item);
        }

        let mut bundle = ContextBundle {
            context_id,
            prepared_at: now,
            memories_by_category,
            relevance_scores,
            context_summary: String::new(),
            security_level: max_security,
            team_access_level: max_security.team_access_label().to_string(),
            preparation_time_ms: 0,
            context_filters_applied: filters_applied,
            total_memories: total,
        };
        bundle.context_summary = bundle.render_summary();
        bundle.preparation_time_ms = start.elapsed().as_millis() as u64;

        info!(
            context_id = %bundle.context_id,
            memories = bundle.total_memories,
            preparation_ms = bundle.preparation_time_ms,
            "prepared context bundle"
        );

        bundle
    }
}

/// Build the ordered, deduplicated query term list.
///
/// Terms come from the task description (whole phrase plus extracted
/// keywords), the request's explicit keywords, and the role filter's boost
/// keywords, capped at [`MAX_QUERY_TERMS`].
fn build_query_terms(request: &ContextRequest, role_filter: &AgentRoleFilter) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |term: &str| {
        let normalized = term.trim().to_lowercase();
        if !normalized.is_empty() && seen.insert(normalized.clone()) {
            terms.push(normalized);
        }
    };

    if !request.task_description.is_empty() {
        push(&request.task_description);
        for word in word_pattern().find_iter(&request.task_description) {
            if word.as_str().len() >= MIN_EXTRACTED_WORD_LEN {
                push(word.as_str());
            }
        }
    }

    for keyword in &request.keywords {
        push(keyword);
    }

    for keyword in &role_filter.keywords {
        push(keyword);
    }

    terms.truncate(MAX_QUERY_TERMS);
    debug!(terms = ?terms, "built retrieval query terms");
    terms
}

/// Determine which categories to search for a request.
fn search_categories(
    request: &ContextRequest,
    role_filter: &AgentRoleFilter,
) -> Vec<MemoryCategory> {
    let mut categories = if !request.categories.is_empty() {
        request.categories.clone()
    } else if request.agent_type.is_some() {
        role_filter.primary_categories.clone()
    } else {
        match request.context_type {
            ContextType::CodeReview => vec![
                MemoryCategory::Pattern,
                MemoryCategory::Team,
                MemoryCategory::Error,
            ],
            ContextType::ArchitectureDecision => {
                vec![MemoryCategory::Project, MemoryCategory::Pattern]
            }
            ContextType::DebuggingSession => {
                vec![MemoryCategory::Error, MemoryCategory::Pattern]
            }
            ContextType::AgentTask | ContextType::ProjectOverview => {
                vec![MemoryCategory::Pattern, MemoryCategory::Project]
            }
        }
    };

    let mut seen = HashSet::new();
    categories.retain(|c| seen.insert(*c));
    categories
}

/// Truncate scored candidates to the total budget.
///
/// When truncation is needed, the budget is distributed so every category
/// that had matches keeps at least its top item (while the budget allows),
/// then remaining slots fill by global score order.
fn select_within_budget(
    scored: Vec<(f64, MemoryItem)>,
    max_memories: usize,
) -> Vec<(f64, MemoryItem)> {
    if scored.len() <= max_memories {
        return scored;
    }

    let mut taken = vec![false; scored.len()];
    let mut count = 0;

    // First pass: top item per category, in canonical category order.
    for category in MemoryCategory::ALL {
        if count >= max_memories {
            break;
        }
        if let Some(idx) = scored
            .iter()
            .position(|(_, item)| item.category == category)
        {
            taken[idx] = true;
            count += 1;
        }
    }

    // Fill the rest by global score order.
    for (idx, _) in scored.iter().enumerate() {
        if count >= max_memories {
            break;
        }
        if !taken[idx] {
            taken[idx] = true;
            count += 1;
        }
    }

    scored
        .into_iter()
        .zip(taken)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect()
}
