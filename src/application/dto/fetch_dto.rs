//! Batch fetch DTOs.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::{FetchResult, ResultReason};

/// Batch fetch request data.
#[derive(Debug, Clone, Default)]
pub struct FetchImagesRequest {
    /// URLs to load, in report order.
    pub urls: Vec<String>,
    /// Aspect-fill target size.
    pub size: Option<(u32, u32)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Bypass both cache tiers.
    pub no_cache: bool,
    /// Directory receiving the first frame of each image as PNG.
    pub output_dir: Option<PathBuf>,
}

impl FetchImagesRequest {
    /// Creates a request for `urls` with no options.
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Self::default()
        }
    }
}

/// Outcome of one URL in a batch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Requested URL.
    pub url: String,
    /// How the request finished.
    pub reason: ResultReason,
    /// Image dimensions, when loaded.
    pub dimensions: Option<(u32, u32)>,
    /// Frame count, when loaded.
    pub frames: usize,
    /// Time spent decoding.
    pub decode_time: Duration,
    /// Time spent downloading.
    pub download_time: Duration,
    /// Where the first frame was written.
    pub saved_to: Option<PathBuf>,
}

impl FetchOutcome {
    /// Builds an outcome from a delivered result.
    #[must_use]
    pub fn from_result(url: impl Into<String>, result: &FetchResult) -> Self {
        Self {
            url: url.into(),
            reason: result.reason,
            dimensions: result.image.as_ref().map(|i| (i.width(), i.height())),
            frames: result.image.as_ref().map_or(0, |i| i.frames().len()),
            decode_time: result.decode_time,
            download_time: result.download_time,
            saved_to: None,
        }
    }

    /// Returns true if an image was obtained.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.reason.is_success()
    }
}

impl std::fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.url, self.reason)?;
        if let Some((width, height)) = self.dimensions {
            write!(f, " {width}x{height}")?;
            if self.frames > 1 {
                write!(f, " ({} frames)", self.frames)?;
            }
        }
        write!(
            f,
            " decode {:.1}ms download {:.1}ms",
            self.decode_time.as_secs_f64() * 1000.0,
            self.download_time.as_secs_f64() * 1000.0
        )?;
        if let Some(path) = &self.saved_to {
            write!(f, " -> {}", path.display())?;
        }
        Ok(())
    }
}
