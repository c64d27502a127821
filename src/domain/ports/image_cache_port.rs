//! Port definition for image caching.

use std::sync::Arc;

use crate::domain::entities::{CacheKey, DecodedImage};

/// Port for in-memory image caching.
/// Implementations must be thread-safe.
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image from the cache.
    /// Returns None if not cached.
    fn get(&self, key: &CacheKey) -> Option<Arc<DecodedImage>>;

    /// Stores an image in the cache.
    fn put(&self, key: CacheKey, image: Arc<DecodedImage>);

    /// Removes an image from the cache.
    fn evict(&self, key: &CacheKey);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    fn clear(&self);
}
