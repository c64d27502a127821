//! Cache key and disk path derivation.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// File extension used for cached content files.
pub const CACHE_FILE_EXTENSION: &str = "img";

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Identifies a (URL, filter) pair in the memory cache.
///
/// Two requests for the same URL with the same filter identifier share a key;
/// a different filter identifier on the same URL yields a distinct entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `url` transformed by the filter named `filter_id`.
    ///
    /// Pass an empty identifier when no filter applies.
    #[must_use]
    pub fn derive(url: &str, filter_id: &str) -> Self {
        Self(digest(&format!("{url}_{filter_id}")))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location of a URL's raw bytes inside the disk cache root.
///
/// Depends on the URL alone, so every filter applied to one URL shares a
/// single disk entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskPath(PathBuf);

impl DiskPath {
    /// Derives the content file path for `url` under `cache_root`.
    #[must_use]
    pub fn derive(url: &str, cache_root: &Path) -> Self {
        Self(cache_root.join(format!("{}.{CACHE_FILE_EXTENSION}", digest(url))))
    }

    /// Returns the file system path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for DiskPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for DiskPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
