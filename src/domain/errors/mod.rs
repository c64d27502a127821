//! Domain error types.

mod cache_error;
mod transport_error;

pub use cache_error::{CacheError, CacheResult};
pub use transport_error::TransportError;
