//! Format sniffing and decoding of fetched bytes.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame};
use tracing::trace;

use crate::domain::entities::{DecodedImage, Filter};
use crate::domain::errors::{CacheError, CacheResult};

/// Display time assumed for frames without usable timing.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
// acTL directly after IHDR: 8 byte signature + 25 byte IHDR chunk.
const ACTL_OFFSET: usize = 33;
const ACTL_HEADER: [u8; 8] = [0x00, 0x00, 0x00, 0x08, b'a', b'c', b'T', b'L'];

/// Container detected from a byte stream's magic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// RIFF/WEBP container, still or animated.
    WebP,
    /// GIF, possibly animated.
    Gif,
    /// PNG with an animation control chunk.
    Apng,
    /// Anything else; left to the generic raster decoder.
    Raster,
}

impl ImageKind {
    /// Sniffs the container from leading bytes.
    #[must_use]
    pub fn sniff(data: &[u8]) -> Self {
        if data.len() >= 16 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Self::WebP
        } else if data.len() >= 4 && &data[0..3] == b"GIF" {
            Self::Gif
        } else if data.len() >= 64
            && data[0..8] == PNG_SIGNATURE
            && data[ACTL_OFFSET..ACTL_OFFSET + 8] == ACTL_HEADER
        {
            Self::Apng
        } else {
            Self::Raster
        }
    }
}

/// Decodes bytes into a displayable image, applying the filter's converters.
///
/// # Errors
/// Returns `CacheError::DecodeError` if a converter rejects its input or no
/// decoder accepts the bytes.
pub fn decode(data: Vec<u8>, filter: Option<&Filter>) -> CacheResult<DecodedImage> {
    let data = match filter {
        Some(filter) => filter
            .convert_data(data)
            .ok_or_else(|| CacheError::DecodeError("data converter rejected bytes".into()))?,
        None => data,
    };

    let kind = ImageKind::sniff(&data);
    trace!(kind = ?kind, size = data.len(), "Decoding image");

    let image = match kind {
        ImageKind::WebP => decode_webp(&data),
        ImageKind::Gif => decode_gif(&data),
        ImageKind::Apng => decode_apng(&data),
        ImageKind::Raster => image::load_from_memory(&data).map(DecodedImage::still),
    }
    .map_err(|e| CacheError::DecodeError(format!("Failed to decode {kind:?} image: {e}")))?;

    match filter {
        Some(filter) => filter
            .convert_image(image)
            .ok_or_else(|| CacheError::DecodeError("image converter rejected image".into())),
        None => Ok(image),
    }
}

fn decode_webp(data: &[u8]) -> image::ImageResult<DecodedImage> {
    let decoder = WebPDecoder::new(Cursor::new(data))?;
    if !decoder.has_animation() {
        return DynamicImage::from_decoder(decoder).map(DecodedImage::still);
    }
    let frames = decoder.into_frames().collect_frames()?;
    summed_animation(frames)
}

fn decode_gif(data: &[u8]) -> image::ImageResult<DecodedImage> {
    let frames = GifDecoder::new(Cursor::new(data))?
        .into_frames()
        .collect_frames()?;
    summed_animation(frames)
}

fn decode_apng(data: &[u8]) -> image::ImageResult<DecodedImage> {
    let decoder = PngDecoder::new(Cursor::new(data))?;
    if !decoder.is_apng()? {
        return DynamicImage::from_decoder(decoder).map(DecodedImage::still);
    }
    let mut frames = decoder.apng()?.into_frames().collect_frames()?;
    if frames.len() == 1 {
        let frame = frames.remove(0);
        return Ok(DecodedImage::still(DynamicImage::ImageRgba8(frame.into_buffer())));
    }
    let delays: Vec<Duration> = frames.iter().map(frame_delay).collect();
    let images: Vec<Arc<DynamicImage>> = frames.into_iter().map(frame_image).collect();
    expand_frames(images, &delays).ok_or_else(empty_animation)
}

/// Total duration is the sum of frame delays, or the default per frame when
/// no frame carries a delay.
fn summed_animation(frames: Vec<Frame>) -> image::ImageResult<DecodedImage> {
    let mut duration: Duration = frames.iter().map(frame_delay).sum();
    if duration.is_zero() {
        duration = DEFAULT_FRAME_DELAY * u32::try_from(frames.len()).unwrap_or(u32::MAX);
    }
    let images = frames.into_iter().map(frame_image).collect();
    DecodedImage::animated(images, duration).ok_or_else(empty_animation)
}

/// Repeats frames so a fixed frame rate still conveys per-frame timing.
///
/// Each frame is repeated `delay / shortest_delay` times and the total
/// duration is the sum of delays. Without usable timing every frame is shown
/// once for the default delay.
#[must_use]
pub fn expand_frames(images: Vec<Arc<DynamicImage>>, delays: &[Duration]) -> Option<DecodedImage> {
    let frame_count = u32::try_from(images.len()).unwrap_or(u32::MAX);
    let shortest = delays.iter().min().copied().unwrap_or_default();

    if delays.len() != images.len() || shortest.is_zero() {
        return DecodedImage::animated(images, DEFAULT_FRAME_DELAY * frame_count);
    }

    let total: Duration = delays.iter().sum();
    let mut expanded = Vec::with_capacity(images.len());
    for (image, delay) in images.iter().zip(delays) {
        let repeats = (delay.as_nanos() / shortest.as_nanos()).max(1);
        for _ in 0..repeats {
            expanded.push(image.clone());
        }
    }
    DecodedImage::animated(expanded, total)
}

fn frame_delay(frame: &Frame) -> Duration {
    let (numer, denom) = frame.delay().numer_denom_ms();
    if denom == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(u64::from(numer) * 1_000_000 / u64::from(denom))
}

fn frame_image(frame: Frame) -> Arc<DynamicImage> {
    Arc::new(DynamicImage::ImageRgba8(frame.into_buffer()))
}

fn empty_animation() -> image::ImageError {
    image::ImageError::Decoding(image::error::DecodingError::new(
        image::error::ImageFormatHint::Unknown,
        "animation has no frames",
    ))
}
