//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, DecodedImage, DiskPath, FetchResult, Filter, ResultReason, TaskState};
pub use errors::{CacheError, CacheResult, TransportError};
pub use ports::{ImageCachePort, TransportPort, TransportRequest, TransportResponse};
