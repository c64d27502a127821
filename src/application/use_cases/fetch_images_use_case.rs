//! Batch image fetch use case.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::application::dto::{FetchImagesRequest, FetchOutcome};
use crate::domain::entities::{CacheKey, DecodedImage, FetchResult, Filter, ResultReason};
use crate::domain::errors::{CacheError, CacheResult};
use crate::infrastructure::image::{ImageLoader, ImageRequest};

/// Loads a batch of URLs concurrently through the loader.
#[derive(Clone)]
pub struct FetchImagesUseCase {
    loader: Arc<ImageLoader>,
}

impl FetchImagesUseCase {
    /// Creates new fetch use case.
    #[must_use]
    pub const fn new(loader: Arc<ImageLoader>) -> Self {
        Self { loader }
    }

    /// Loads every URL and reports each outcome in request order.
    pub async fn execute(&self, request: FetchImagesRequest) -> Vec<FetchOutcome> {
        debug!(count = request.urls.len(), "Fetching batch");

        let outcomes = join_all(request.urls.iter().map(|url| self.fetch_one(url, &request))).await;

        let loaded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(loaded, failed = outcomes.len() - loaded, "Batch finished");
        outcomes
    }

    async fn fetch_one(&self, url: &str, request: &FetchImagesRequest) -> FetchOutcome {
        let mut image_request = request
            .headers
            .iter()
            .fold(ImageRequest::get(url), |r, (name, value)| r.header(name, value));
        if let Some((width, height)) = request.size {
            image_request = image_request.filter(Filter::resizer(width, height));
        }
        if request.no_cache {
            image_request = image_request.no_cache();
        }

        let result = self
            .loader
            .request(image_request)
            .wait()
            .await
            .unwrap_or_else(|| FetchResult::failed(ResultReason::Cancelled));

        let mut outcome = FetchOutcome::from_result(url, &result);
        if let (Some(dir), Some(image)) = (&request.output_dir, result.image) {
            match save_first_frame(dir, url, image).await {
                Ok(path) => outcome.saved_to = Some(path),
                Err(e) => warn!(url, error = %e, "Failed to write image"),
            }
        }
        outcome
    }
}

async fn save_first_frame(dir: &Path, url: &str, image: Arc<DecodedImage>) -> CacheResult<PathBuf> {
    let path = dir.join(format!("{}.png", CacheKey::derive(url, "")));
    let dir = dir.to_path_buf();
    let target = path.clone();

    tokio::task::spawn_blocking(move || -> CacheResult<()> {
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io("Failed to create output dir", &e))?;
        image
            .first_frame()
            .save_with_format(&target, image::ImageFormat::Png)
            .map_err(|e| CacheError::IoError(format!("Failed to encode PNG: {e}")))
    })
    .await
    .map_err(|e| CacheError::IoError(format!("Write task panicked: {e}")))??;

    Ok(path)
}
