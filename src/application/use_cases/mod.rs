//! Use case implementations.

mod fetch_images_use_case;

pub use fetch_images_use_case::FetchImagesUseCase;
