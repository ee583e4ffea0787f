//! Bundle cache with TTL and concurrent coalescing.
//!
//! Bundles are cached by the deterministic request key. Expired entries
//! are purged lazily on the next access, not by a background sweep.
//!
//! Concurrent requests for the same key coalesce onto a single
//! computation: each entry holds a `tokio::sync::OnceCell`, so the first
//! caller runs the preparation future and later callers await the same
//! cell. The entry map itself is guarded by a plain mutex that is never
//! held across an await point, which is sufficient under the cooperative
//! scheduling model (no OS threads mutate it concurrently).

use crate::context::bundle::ContextBundle;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Default bundle time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheEntry {
    created: Instant,
    cell: Arc<OnceCell<ContextBundle>>,
}

impl CacheEntry {
    /// Pending entries never expire; a computation in flight must not be
    /// dropped out from under its waiters.
    fn expired(&self, ttl: Duration) -> bool {
        self.cell.initialized() && self.created.elapsed() >= ttl
    }
}

/// Associative bundle store keyed by request digest.
pub struct ContextCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached bundle for `key`, or run `prepare` to compute it.
    ///
    /// Exactly one preparation runs per fresh key, no matter how many
    /// callers arrive concurrently; all of them receive the same bundle.
    pub async fn get_or_prepare<F, Fut>(&self, key: &str, prepare: F) -> ContextBundle
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ContextBundle>,
    {
        let cell = self.slot(key);
        cell.get_or_init(prepare).await.clone()
    }

    /// Look up or create the cell for `key`, purging expired entries.
    fn slot(&self, key: &str) -> Arc<OnceCell<ContextBundle>> {
        let mut entries = self.entries.lock().expect("context cache lock poisoned");

        // Lazy purge on access.
        let ttl = self.ttl;
        entries.retain(|_, entry| !entry.expired(ttl));

        if let Some(entry) = entries.get(key) {
            return entry.cell.clone();
        }

        let cell = Arc::new(OnceCell::new());
        entries.insert(
            key.to_string(),
            CacheEntry {
                created: Instant::now(),
                cell: cell.clone(),
            },
        );
        cell
    }

    /// Number of live (resolved or in-flight) entries.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().expect("context cache lock poisoned");
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
