//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// HTTP transport.
pub mod http;
/// Image handling (caching, decoding, loading).
pub mod image;

pub use config::{AppConfig, CliArgs, LoaderConfig, LogLevel, ConfigStore};
pub use http::HttpTransport;
pub use image::{
    CacheStats, DiskImageCache, Fetch, ImageLoader, ImageRequest, LifecycleEvent,
    MemoryImageCache, PendingFetch, SweepReport, TaskHandle,
};
