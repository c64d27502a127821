//! pixfetch - An image acquisition cache.
//!
//! Given a URL and an optional filter, this crate returns a decoded,
//! ready-to-display image from an in-memory cache, an on-disk cache or the
//! network, in that order, while bounding how much each tier can grow.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing use cases and DTOs.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, codecs, transport and configuration.
pub mod infrastructure;
/// Presentation layer containing view bindings and command output.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixfetch";
