//! Data transfer objects for the application layer.

mod fetch_dto;

pub use fetch_dto::{FetchImagesRequest, FetchOutcome};
