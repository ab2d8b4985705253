use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::utils::Counter;

use super::path::Resolution;
use super::tree::TreeId;

type CacheMap = DashMap<(TreeId, String), Arc<Resolution>, ahash::RandomState>;

/// Memoized classifications, keyed by tree identity and normalized path.
///
/// Entries are never evicted, the routing tree never changes.
pub struct ClassificationCache {
    entries: CacheMap,
    hits: Counter,
    misses: Counter,
}

impl ClassificationCache {
    #[inline]
    pub fn new() -> Self {
        Self { entries: CacheMap::default(), hits: Counter::new(), misses: Counter::new() }
    }

    /// Returns the stored resolution, or computes and stores it. `compute`
    /// is not called on a hit.
    pub fn get_or_compute<F>(&self, tree_id: TreeId, normalized: &str, compute: F) -> Arc<Resolution>
    where
        F: FnOnce() -> Resolution,
    {
        let key = (tree_id, normalized.to_owned());
        if let Some(res) = self.entries.get(&key) {
            self.hits.inc();
            return res.value().clone();
        }
        self.entries
            .entry(key)
            .or_insert_with(|| {
                self.misses.inc();
                Arc::new(compute())
            })
            .value()
            .clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn hits(&self) -> &Counter {
        &self.hits
    }

    #[inline]
    pub fn misses(&self) -> &Counter {
        &self.misses
    }

    #[inline]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "entries": self.len(),
            "hits": self.hits.count(),
            "misses": self.misses.count(),
        })
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassificationCache {:?}", self.to_json())
    }
}
