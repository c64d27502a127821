//! Named transforms applied to fetched bytes and decoded images.

use std::sync::Arc;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::DecodedImage;

/// Parameters handed to a filter's converters.
pub type FilterParams = serde_json::Map<String, serde_json::Value>;

/// Rewrites raw bytes before decoding. Returning `None` fails the decode.
pub type DataConverter = Arc<dyn Fn(&[u8], &FilterParams) -> Option<Vec<u8>> + Send + Sync>;

/// Rewrites a decoded image. Returning `None` fails the decode.
pub type ImageConverter =
    Arc<dyn Fn(DecodedImage, &FilterParams) -> Option<DecodedImage> + Send + Sync>;

/// A named, serializable transform descriptor.
///
/// The identifier takes part in the memory cache key. Two filters with equal
/// identifiers are treated as the same transform, so an identifier must
/// uniquely determine what the converters do.
#[derive(Clone, Serialize, Deserialize)]
pub struct Filter {
    identifier: String,
    #[serde(default)]
    params: FilterParams,
    #[serde(skip)]
    data_converter: Option<DataConverter>,
    #[serde(skip)]
    image_converter: Option<ImageConverter>,
}

impl Filter {
    /// Creates a filter with no converters.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            params: FilterParams::new(),
            data_converter: None,
            image_converter: None,
        }
    }

    /// Sets a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the pre-decode byte converter.
    #[must_use]
    pub fn with_data_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&[u8], &FilterParams) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.data_converter = Some(Arc::new(converter));
        self
    }

    /// Sets the post-decode image converter.
    #[must_use]
    pub fn with_image_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(DecodedImage, &FilterParams) -> Option<DecodedImage> + Send + Sync + 'static,
    {
        self.image_converter = Some(Arc::new(converter));
        self
    }

    /// Aspect-fill resize to `width` x `height`, cropping the overflow around
    /// the centre.
    #[must_use]
    pub fn resizer(width: u32, height: u32) -> Self {
        Self::new(format!("resize_{width}x{height}"))
            .with_param("width", width)
            .with_param("height", height)
            .with_image_converter(|image, params| {
                let width = param_u32(params, "width")?;
                let height = param_u32(params, "height")?;
                Some(resize_to_fill(&image, width, height))
            })
    }

    /// Returns the cache identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the converter parameters.
    #[must_use]
    pub const fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Applies the byte converter, passing bytes through when there is none.
    #[must_use]
    pub fn convert_data(&self, data: Vec<u8>) -> Option<Vec<u8>> {
        match &self.data_converter {
            Some(convert) => convert(&data, &self.params),
            None => Some(data),
        }
    }

    /// Applies the image converter, passing the image through when there is none.
    #[must_use]
    pub fn convert_image(&self, image: DecodedImage) -> Option<DecodedImage> {
        match &self.image_converter {
            Some(convert) => convert(image, &self.params),
            None => Some(image),
        }
    }

    /// Returns true if a post-decode converter is set.
    #[must_use]
    pub const fn has_image_converter(&self) -> bool {
        self.image_converter.is_some()
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Filter {}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("identifier", &self.identifier)
            .field("params", &self.params)
            .field("data_converter", &self.data_converter.is_some())
            .field("image_converter", &self.image_converter.is_some())
            .finish()
    }
}

fn param_u32(params: &FilterParams, name: &str) -> Option<u32> {
    params
        .get(name)
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn resize_to_fill(image: &DecodedImage, width: u32, height: u32) -> DecodedImage {
    if width == 0 || height == 0 {
        return image.clone();
    }

    let Some(duration) = image.duration() else {
        return DecodedImage::still(image.first_frame().resize_to_fill(
            width,
            height,
            FilterType::Lanczos3,
        ));
    };

    let mut frames = Vec::with_capacity(image.frames().len());
    let mut last: Option<(&Arc<image::DynamicImage>, Arc<image::DynamicImage>)> = None;
    for frame in image.frames() {
        let resized = match &last {
            Some((source, resized)) if Arc::ptr_eq(source, frame) => resized.clone(),
            _ => Arc::new(frame.resize_to_fill(width, height, FilterType::Lanczos3)),
        };
        frames.push(resized.clone());
        last = Some((frame, resized));
    }

    DecodedImage::animated(frames, duration).unwrap_or_else(|| image.clone())
}
