//! In-memory LRU image cache bounded by entry count and byte cost.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, DecodedImage};
use crate::domain::ports::ImageCachePort;

/// Default maximum number of images to cache in memory.
pub const DEFAULT_COUNT_LIMIT: usize = 200;

/// Default total cost limit in bytes (64 MB).
pub const DEFAULT_COST_LIMIT: u64 = 64 * 1024 * 1024;

struct Inner {
    entries: LruCache<CacheKey, Arc<DecodedImage>>,
    total_cost: u64,
}

/// In-memory LRU cache for decoded images.
///
/// Every operation serialises through one lock. Inserting evicts least
/// recently used entries until both the count and cost limits hold. A limit
/// of zero disables that bound.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    cost_limit: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the given limits.
    #[must_use]
    pub fn new(count_limit: usize, cost_limit: u64) -> Self {
        let entries = NonZeroUsize::new(count_limit).map_or_else(LruCache::unbounded, LruCache::new);
        Self {
            inner: Mutex::new(Inner {
                entries,
                total_cost: 0,
            }),
            cost_limit,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default limits.
    #[must_use]
    pub fn with_default_limits() -> Self {
        Self::new(DEFAULT_COUNT_LIMIT, DEFAULT_COST_LIMIT)
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            total_cost: inner.total_cost,
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Returns the summed cost of all cached images.
    #[must_use]
    pub fn total_cost(&self) -> u64 {
        self.inner.lock().total_cost
    }

    /// Returns the configured cost limit.
    #[must_use]
    pub const fn cost_limit(&self) -> u64 {
        self.cost_limit
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_limits()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Summed cost of cached images in bytes.
    pub total_cost: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.hit_rate, self.hits, self.misses
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let mut inner = self.inner.lock();
        if let Some(img) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn put(&self, key: CacheKey, image: Arc<DecodedImage>) {
        let cost = image.cost();
        let mut inner = self.inner.lock();
        if self.cost_limit > 0 && cost > self.cost_limit {
            // an older image under this key would otherwise outlive its replacement
            if let Some(stale) = inner.entries.pop(&key) {
                inner.total_cost -= stale.cost();
            }
            debug!(key = %key, cost, limit = self.cost_limit, "Image exceeds memory cost limit, not cached");
            return;
        }

        inner.total_cost += cost;
        if let Some((_, displaced)) = inner.entries.push(key.clone(), image) {
            inner.total_cost -= displaced.cost();
        }

        while self.cost_limit > 0 && inner.total_cost > self.cost_limit {
            let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_cost -= evicted.cost();
            trace!(key = %evicted_key, "Evicted image over cost limit");
        }

        debug!(key = %key, cost, total_cost = inner.total_cost, "Stored image in memory cache");
    }

    fn evict(&self, key: &CacheKey) {
        let mut inner = self.inner.lock();
        if let Some(img) = inner.entries.pop(key) {
            inner.total_cost -= img.cost();
            debug!(key = %key, "Evicted image from memory cache");
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_cost = 0;
        debug!("Cleared memory image cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn image(width: u32, height: u32) -> Arc<DecodedImage> {
        Arc::new(DecodedImage::still(DynamicImage::new_rgba8(width, height)))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(name, "")
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(10, 0);
        let img = image(100, 100);

        cache.put(key("a"), img);
        let retrieved = cache.get(&key("a"));

        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().width(), 100);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(10, 0);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_count_eviction() {
        let cache = MemoryImageCache::new(2, 0);

        cache.put(key("1"), image(1, 1));
        cache.put(key("2"), image(1, 1));
        cache.put(key("3"), image(1, 1));

        // "1" is least recently used
        assert!(cache.get(&key("1")).is_none());
        assert!(cache.get(&key("2")).is_some());
        assert!(cache.get(&key("3")).is_some());
    }

    #[test]
    fn test_cost_eviction() {
        // each 8x8 RGBA image costs 256 bytes
        let cache = MemoryImageCache::new(0, 600);

        cache.put(key("1"), image(8, 8));
        cache.put(key("2"), image(8, 8));
        let _ = cache.get(&key("1"));
        cache.put(key("3"), image(8, 8));

        assert!(cache.peek(&key("2")).is_none());
        assert!(cache.peek(&key("1")).is_some());
        assert!(cache.peek(&key("3")).is_some());
        assert_eq!(cache.total_cost(), 512);
    }

    #[test]
    fn test_oversized_entry_skipped() {
        let cache = MemoryImageCache::new(10, 100);
        cache.put(key("big"), image(10, 10));

        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_oversized_replacement_drops_previous_entry() {
        let cache = MemoryImageCache::new(10, 400);
        cache.put(key("a"), image(8, 8));
        cache.put(key("b"), image(4, 4));
        cache.put(key("a"), image(16, 16));

        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 64);
    }

    #[test]
    fn test_replacing_entry_updates_cost() {
        let cache = MemoryImageCache::new(10, 0);
        cache.put(key("a"), image(8, 8));
        cache.put(key("a"), image(4, 4));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 64);
    }

    #[test]
    fn test_clear_and_evict() {
        let cache = MemoryImageCache::new(10, 0);
        cache.put(key("a"), image(2, 2));
        cache.put(key("b"), image(2, 2));

        cache.evict(&key("a"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 16);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(10, 0);
        cache.put(key("a"), image(1, 1));

        // Hit
        let _ = cache.get(&key("a"));
        // Miss
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.total_cost, 4);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(2, 0);

        cache.put(key("1"), image(1, 1));
        cache.put(key("2"), image(1, 1));

        // Peek at "1" (should not promote it)
        let _ = cache.peek(&key("1"));

        cache.put(key("3"), image(1, 1));

        assert!(cache.peek(&key("1")).is_none());
    }
}
