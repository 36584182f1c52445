//! LRU cache of compiled expressions, keyed by source text.
//!
//! Grounded in the teacher's expression-cache idiom: an `lru::LruCache`
//! behind a `parking_lot::RwLock`, with atomic hit/miss counters for callers
//! that want to monitor cache effectiveness under load.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::RwLock;

use crate::Expression;
use crate::parser::ParseError;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct ExpressionCache {
    inner: RwLock<LruCache<String, Arc<Expression>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self { inner: RwLock::new(LruCache::new(capacity)), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// Returns the cached `Expression` for `source`, compiling and inserting
    /// it on a miss.
    pub fn get(&self, source: &str) -> Result<Arc<Expression>, ParseError> {
        if let Some(expr) = self.inner.write().get(source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(expr.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let expr = Arc::new(crate::compile(source)?);
        self.inner.write().put(source.to_string(), expr.clone());
        Ok(expr)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let cache = ExpressionCache::default();
        cache.get("Patient.name").unwrap();
        cache.get("Patient.name").unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn invalid_source_does_not_poison_the_cache() {
        let cache = ExpressionCache::default();
        assert!(cache.get("Patient.(").is_err());
        assert!(cache.is_empty());
    }
}
