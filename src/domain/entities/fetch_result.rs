//! Outcome of an image request.

use std::sync::Arc;
use std::time::Duration;

use super::DecodedImage;

/// Why a request finished the way it did.
///
/// Negative codes are failures, non-negative codes are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultReason {
    /// The task was cancelled. Never delivered to a completion.
    Cancelled = -100,
    /// Bytes were obtained but no decoder accepted them.
    DecodeFailed = -99,
    /// Bad status, non-transient transport error, or retry budget exhausted.
    DownloadFailed = -98,
    /// The server answered successfully without a body.
    NoData = -97,
    /// Served from the in-memory cache.
    MemoryCached = 0,
    /// Decoded from the disk cache.
    FileCached = 1,
    /// Downloaded from the network.
    Downloaded = 2,
}

impl ResultReason {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Returns true for the success class.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.code() >= 0
    }
}

impl std::fmt::Display for ResultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DecodeFailed => write!(f, "decode failed"),
            Self::DownloadFailed => write!(f, "download failed"),
            Self::NoData => write!(f, "no data"),
            Self::MemoryCached => write!(f, "memory"),
            Self::FileCached => write!(f, "disk"),
            Self::Downloaded => write!(f, "network"),
        }
    }
}

/// Result delivered to a requester.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The decoded image, `None` on failure.
    pub image: Option<Arc<DecodedImage>>,
    /// Classification of the outcome.
    pub reason: ResultReason,
    /// Time spent decoding.
    pub decode_time: Duration,
    /// Time spent on the final download attempt.
    pub download_time: Duration,
}

impl FetchResult {
    /// Successful result without timing information.
    #[must_use]
    pub const fn loaded(image: Arc<DecodedImage>, reason: ResultReason) -> Self {
        Self {
            image: Some(image),
            reason,
            decode_time: Duration::ZERO,
            download_time: Duration::ZERO,
        }
    }

    /// Failed result.
    #[must_use]
    pub const fn failed(reason: ResultReason) -> Self {
        Self {
            image: None,
            reason,
            decode_time: Duration::ZERO,
            download_time: Duration::ZERO,
        }
    }

    /// Attaches decode timing.
    #[must_use]
    pub const fn with_decode_time(mut self, decode_time: Duration) -> Self {
        self.decode_time = decode_time;
        self
    }

    /// Attaches download timing.
    #[must_use]
    pub const fn with_download_time(mut self, download_time: Duration) -> Self {
        self.download_time = download_time;
        self
    }

    /// Returns true if an image was produced.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.reason.is_success()
    }
}
