//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction
//! - Disk caching for persistence
//! - Decoding of still and animated formats
//! - The fetch task state machine and the loader facade

pub mod codec;
pub mod disk_cache;
pub mod fetch_task;
pub mod loader;
pub mod memory_cache;
pub mod scheduler;

pub use codec::ImageKind;
pub use disk_cache::{DiskImageCache, SweepReport};
pub use fetch_task::{MAX_DOWNLOAD_ATTEMPTS, TaskHandle};
pub use loader::{Fetch, ImageLoader, ImageRequest, LifecycleEvent, PendingFetch};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use scheduler::{DeliveryContext, TaskScheduler};
