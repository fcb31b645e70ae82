//! Key-value cache collaborator addressed by capabilities.

use dashmap::DashMap;
use serde_json::Value;

/// Destination for cache upserts issued by capabilities.
///
/// Upserts are fire-and-forget: implementations must not block for long and
/// have no way to report failure back to the caller.
pub trait CacheStore: Send + Sync {
    /// Inserts or replaces `key` in the namespace owned by `owner`.
    fn upsert(&self, owner: &str, key: &str, value: Value);
}

/// In-process cache store, keyed by `(owner, key)`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(String, String), Value>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key` by `owner`.
    pub fn get(&self, owner: &str, key: &str) -> Option<Value> {
        self.entries
            .get(&(owner.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Returns the number of entries across all owners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn upsert(&self, owner: &str, key: &str, value: Value) {
        self.entries
            .insert((owner.to_string(), key.to_string()), value);
    }
}
