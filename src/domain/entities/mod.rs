//! Domain entity definitions.

mod cache_key;
mod decoded_image;
mod fetch_result;
mod filter;
mod task_state;

pub use cache_key::{CACHE_FILE_EXTENSION, CacheKey, DiskPath};
pub use decoded_image::DecodedImage;
pub use fetch_result::{FetchResult, ResultReason};
pub use filter::{DataConverter, Filter, FilterParams, ImageConverter};
pub use task_state::TaskState;
