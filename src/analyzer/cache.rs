//! Bounded memoization for schema analysis.
//!
//! Keyed by normalized question text so repeated verbatim questions skip the
//! keyword scan. Purely an optimization: entries are evicted in insertion
//! order once the bound is reached, and concurrent requests for the same key
//! may duplicate work rather than block each other.

use crate::models::SchemaContext;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Default number of cached analyses.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

#[derive(Debug)]
pub struct AnalysisCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, SchemaContext>,
    order: VecDeque<String>,
}

impl AnalysisCache {
    /// Create a cache with the given capacity. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Look up a previously analyzed question.
    pub fn get(&self, key: &str) -> Option<SchemaContext> {
        let inner = self.inner.lock().expect("analysis cache poisoned");
        inner.entries.get(key).cloned()
    }

    /// Store an analysis result, evicting the oldest entry when full.
    /// At most one entry per key.
    pub fn insert(&self, key: String, context: SchemaContext) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("analysis cache poisoned");
        if inner.entries.insert(key.clone(), context).is_none() {
            inner.order.push_back(key);
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("analysis cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SchemaContext {
        SchemaContext::default()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = AnalysisCache::new(4);
        cache.insert("how many catchments".to_string(), ctx());
        assert!(cache.get("how many catchments").is_some());
        assert!(cache.get("unknown").is_none());
    }

    #[test]
    fn test_at_most_one_entry_per_key() {
        let cache = AnalysisCache::new(4);
        cache.insert("q".to_string(), ctx());
        cache.insert("q".to_string(), ctx());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_in_insertion_order() {
        let cache = AnalysisCache::new(2);
        cache.insert("a".to_string(), ctx());
        cache.insert("b".to_string(), ctx());
        cache.insert("c".to_string(), ctx());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = AnalysisCache::new(0);
        cache.insert("q".to_string(), ctx());
        assert!(cache.is_empty());
    }
}
