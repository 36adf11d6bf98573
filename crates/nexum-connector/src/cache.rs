//! Per-instance cache for expensive provider lookups.
//!
//! Entries have no expiry. Freshness comes from event-driven invalidation:
//! webhook processing removes affected entries before it acknowledges the
//! delivery, so a subsequent read repopulates from the provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Cache of lookup results keyed by resource type plus an optional record
/// id, so a webhook naming a resource type can drop every entry for that
/// type in one step.
///
/// Scoped to one connector instance; instances never share entries.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Resource types with at least one entry.
    pub resource_types: usize,
    /// Entries currently cached across all resource types.
    pub entries: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
}

/// Collection-level entries (no record id) share the sub-map under a
/// reserved empty slot.
fn slot(sub_id: Option<&str>) -> &str {
    sub_id.unwrap_or("")
}

impl ResultCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached value.
    pub async fn get(&self, resource_type: &str, sub_id: Option<&str>) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        match entries.get(resource_type).and_then(|sub| sub.get(slot(sub_id))) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value, replacing any previous entry under the same key.
    pub async fn put(
        &self,
        resource_type: impl Into<String>,
        sub_id: Option<&str>,
        value: serde_json::Value,
    ) {
        self.entries
            .write()
            .await
            .entry(resource_type.into())
            .or_default()
            .insert(slot(sub_id).to_string(), value);
    }

    /// Remove one entry. Returns whether an entry existed.
    pub async fn invalidate(&self, resource_type: &str, sub_id: Option<&str>) -> bool {
        let mut entries = self.entries.write().await;
        let Some(sub) = entries.get_mut(resource_type) else {
            return false;
        };
        let removed = sub.remove(slot(sub_id)).is_some();
        if sub.is_empty() {
            entries.remove(resource_type);
        }
        if removed {
            debug!(resource_type = %resource_type, sub_id = sub_id.unwrap_or(""), "cache entry invalidated");
        }
        removed
    }

    /// Remove every entry for one resource type.
    /// Returns the number of entries removed.
    pub async fn invalidate_resource(&self, resource_type: &str) -> usize {
        let removed = self
            .entries
            .write()
            .await
            .remove(resource_type)
            .map_or(0, |sub| sub.len());
        if removed > 0 {
            debug!(resource_type = %resource_type, removed, "cache entries invalidated for resource type");
        }
        removed
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cached entries across all resource types.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(HashMap::len).sum()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            resource_types: entries.len(),
            entries: entries.values().map(HashMap::len).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
