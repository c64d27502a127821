//! Decoded, ready-to-display images.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;

/// A decoded still or animated image.
///
/// Animated images keep every display frame in order. Frames repeated to
/// convey relative timing share one allocation.
#[derive(Clone)]
pub struct DecodedImage {
    frames: Vec<Arc<DynamicImage>>,
    duration: Option<Duration>,
    cost: u64,
}

impl DecodedImage {
    /// Wraps a single still image.
    #[must_use]
    pub fn still(image: DynamicImage) -> Self {
        let cost = frame_cost(&image);
        Self {
            frames: vec![Arc::new(image)],
            duration: None,
            cost,
        }
    }

    /// Builds an animation from its display frames and total duration.
    ///
    /// Returns `None` when `frames` is empty.
    #[must_use]
    pub fn animated(frames: Vec<Arc<DynamicImage>>, duration: Duration) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        let mut cost = 0u64;
        let mut previous: Option<&Arc<DynamicImage>> = None;
        for frame in &frames {
            if previous.is_none_or(|p| !Arc::ptr_eq(p, frame)) {
                cost += frame_cost(frame);
            }
            previous = Some(frame);
        }
        Some(Self {
            frames,
            duration: Some(duration),
            cost,
        })
    }

    /// Returns the first (or only) frame.
    #[must_use]
    pub fn first_frame(&self) -> &DynamicImage {
        &self.frames[0]
    }

    /// Returns every display frame.
    #[must_use]
    pub fn frames(&self) -> &[Arc<DynamicImage>] {
        &self.frames
    }

    /// Total animation duration, `None` for still images.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns true if this image has an animation timeline.
    #[must_use]
    pub const fn is_animated(&self) -> bool {
        self.duration.is_some()
    }

    /// Width of the first frame in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.first_frame().width()
    }

    /// Height of the first frame in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.first_frame().height()
    }

    /// Approximate resident size in bytes, used as memory cache cost.
    #[must_use]
    pub const fn cost(&self) -> u64 {
        self.cost
    }
}

fn frame_cost(image: &DynamicImage) -> u64 {
    u64::from(image.width()) * u64::from(image.height()) * 4
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("frames", &self.frames.len())
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}
