//! Test fixtures shared across unit tests.

use crate::error::{ConductorError, Result};
use crate::memory::{MemoryCategory, MemoryGateway, MemoryItem};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Build a public memory item with defaults suitable for most tests.
pub fn memory(id: &str, category: MemoryCategory, content: &str) -> MemoryItem {
    MemoryItem {
        id: id.to_string(),
        content: content.to_string(),
        category,
        tags: BTreeSet::new(),
        security_level: Default::default(),
        project: None,
        created_at: Utc::now(),
    }
}

/// In-memory gateway over a fixed set of items.
///
/// Counts every `search` call, can delay responses (to exercise request
/// coalescing), and can be told to fail for specific categories.
pub struct StaticGateway {
    memories: Vec<MemoryItem>,
    calls: Arc<AtomicUsize>,
    fail_categories: HashSet<MemoryCategory>,
    delay: Option<Duration>,
}

impl StaticGateway {
    pub fn with_memories(memories: Vec<MemoryItem>) -> Self {
        Self {
            memories,
            calls: Arc::new(AtomicUsize::new(0)),
            fail_categories: HashSet::new(),
            delay: None,
        }
    }

    /// Delay every search by `delay` before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every search against `category`.
    pub fn failing_category(mut self, category: MemoryCategory) -> Self {
        self.fail_categories.insert(category);
        self
    }

    /// Shared counter of search calls made so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl MemoryGateway for StaticGateway {
    async fn search(
        &self,
        category: MemoryCategory,
        _query_terms: &[String],
        project_scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_categories.contains(&category) {
            return Err(ConductorError::GatewayError(format!(
                "category '{}' unavailable",
                category
            )));
        }

        Ok(self
            .memories
            .iter()
            .filter(|m| m.category == category)
            .filter(|m| match project_scope {
                Some(project) => m.project.as_deref() == Some(project),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Gateway whose every call fails, simulating an unreachable store.
pub struct FailingGateway;

#[async_trait]
impl MemoryGateway for FailingGateway {
    async fn search(
        &self,
        _category: MemoryCategory,
        _query_terms: &[String],
        _project_scope: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        Err(ConductorError::GatewayError(
            "memory store unreachable".to_string(),
        ))
    }
}
