//! Disk-based cache of raw downloaded image bytes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{CACHE_FILE_EXTENSION, DiskPath};
use crate::domain::errors::{CacheError, CacheResult};

/// Maximum disk cache size in bytes (1 GB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 1024 * 1024 * 1024;

/// Default content file lifetime (3 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400 * 3);

/// A content file as seen by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFileInfo {
    /// File location.
    pub path: PathBuf,
    /// Time since the file was created.
    pub age: Duration,
    /// File size in bytes.
    pub size: u64,
}

/// Files selected for removal by a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Files older than the TTL.
    pub expired: Vec<PathBuf>,
    /// Files removed to get under the size limit, oldest first.
    pub evicted: Vec<PathBuf>,
    /// Bytes left once every planned removal is done.
    pub remaining_size: u64,
}

/// Decides which files a sweep removes.
///
/// Files whose age strictly exceeds `ttl` go first and do not count towards
/// the size total. If what is left still exceeds `max_size`, the oldest
/// remaining files go until it fits. A zero `ttl` or `max_size` disables
/// that rule.
#[must_use]
pub fn plan_sweep(files: Vec<CacheFileInfo>, ttl: Duration, max_size: u64) -> SweepPlan {
    let mut plan = SweepPlan::default();
    let mut kept = Vec::with_capacity(files.len());

    for file in files {
        if !ttl.is_zero() && file.age > ttl {
            plan.expired.push(file.path);
        } else {
            plan.remaining_size += file.size;
            kept.push(file);
        }
    }

    if max_size == 0 || plan.remaining_size <= max_size {
        return plan;
    }

    kept.sort_by(|a, b| b.age.cmp(&a.age));
    for file in kept {
        if plan.remaining_size <= max_size {
            break;
        }
        plan.remaining_size -= file.size;
        plan.evicted.push(file.path);
    }

    plan
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files removed for exceeding the TTL.
    pub expired: usize,
    /// Files removed for size pressure.
    pub evicted: usize,
    /// Bytes actually freed.
    pub bytes_freed: u64,
    /// Bytes left in the cache.
    pub remaining_size: u64,
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expired {}, evicted {}, freed {} bytes, {} bytes remaining",
            self.expired, self.evicted, self.bytes_freed, self.remaining_size
        )
    }
}

/// Disk-based image cache that persists raw image bytes.
///
/// One flat directory of `<digest>.img` files. Age and size come from file
/// system attributes; there is no index.
#[derive(Debug)]
pub struct DiskImageCache {
    cache_dir: PathBuf,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf) -> CacheResult<Self> {
        let cache = Self { cache_dir };
        cache.ensure_root().await?;
        Ok(cache)
    }

    /// Returns the cache root directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the content file path for a URL.
    #[must_use]
    pub fn path_for(&self, url: &str) -> DiskPath {
        DiskPath::derive(url, &self.cache_dir)
    }

    /// Creates the cache root if it is missing.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub async fn ensure_root(&self) -> CacheResult<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CacheError::io("Failed to create cache dir", &e))
    }

    /// Checks if a content file exists.
    pub async fn contains(&self, path: &DiskPath) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Gets raw image bytes from disk cache.
    pub async fn get_bytes(&self, path: &DiskPath) -> Option<Vec<u8>> {
        match fs::read(path).await {
            Ok(bytes) => {
                trace!(path = %path, size = bytes.len(), "Disk cache hit");
                Some(bytes)
            }
            Err(e) => {
                trace!(path = %path, error = %e, "Disk cache miss");
                None
            }
        }
    }

    /// Stores raw bytes in the disk cache.
    ///
    /// The bytes go to a temporary file in the cache root which is then
    /// renamed over the target, so readers never see a partial file.
    ///
    /// # Errors
    /// Returns error if the file cannot be created, written or renamed.
    pub async fn put_bytes(&self, path: &DiskPath, bytes: Bytes) -> CacheResult<()> {
        let root = self.cache_dir.clone();
        let target = path.as_path().to_path_buf();
        let size = bytes.len();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&root)?;
            let mut temp_file = tempfile::NamedTempFile::new_in(&root)?;
            temp_file.write_all(&bytes)?;
            temp_file.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::IoError(format!("Write task panicked: {e}")))?
        .map_err(|e| CacheError::io("Failed to write cache file", &e))?;

        debug!(path = %path, size, "Stored image in disk cache");
        Ok(())
    }

    /// Removes a content file.
    pub async fn evict(&self, path: &DiskPath) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path, error = %e, "Failed to evict from disk cache");
            }
        } else {
            debug!(path = %path, "Evicted from disk cache");
        }
    }

    /// Lists content files with their age relative to `now` and size.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn scan(&self, now: SystemTime) -> CacheResult<Vec<CacheFileInfo>> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::io("Failed to read cache dir", &e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io("Failed to read entry", &e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != CACHE_FILE_EXTENSION) {
                continue;
            }

            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(now);
            files.push(CacheFileInfo {
                path,
                age: now.duration_since(created).unwrap_or(Duration::ZERO),
                size: meta.len(),
            });
        }

        Ok(files)
    }

    /// Removes expired files, then the oldest files while over `max_size`.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created or read.
    pub async fn sweep(&self, ttl: Duration, max_size: u64) -> CacheResult<SweepReport> {
        self.sweep_at(SystemTime::now(), ttl, max_size).await
    }

    /// Same as [`Self::sweep`] with file ages measured against `now`.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created or read.
    pub async fn sweep_at(
        &self,
        now: SystemTime,
        ttl: Duration,
        max_size: u64,
    ) -> CacheResult<SweepReport> {
        self.ensure_root().await?;

        let files = self.scan(now).await?;
        let sizes: std::collections::HashMap<PathBuf, u64> =
            files.iter().map(|f| (f.path.clone(), f.size)).collect();
        let plan = plan_sweep(files, ttl, max_size);

        let mut report = SweepReport {
            remaining_size: plan.remaining_size,
            ..SweepReport::default()
        };

        for path in &plan.expired {
            if remove_quietly(path).await {
                report.expired += 1;
                report.bytes_freed += sizes.get(path).copied().unwrap_or(0);
            }
        }
        for path in &plan.evicted {
            if remove_quietly(path).await {
                report.evicted += 1;
                report.bytes_freed += sizes.get(path).copied().unwrap_or(0);
            }
        }

        info!(
            expired = report.expired,
            evicted = report.evicted,
            bytes_freed = report.bytes_freed,
            remaining = report.remaining_size,
            "Disk cache sweep complete"
        );

        Ok(report)
    }

    /// Deletes the whole cache root and recreates it empty.
    ///
    /// # Errors
    /// Returns error if the directory cannot be removed or recreated.
    pub async fn reset(&self) -> CacheResult<()> {
        match fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io("Failed to remove cache dir", &e)),
        }
        self.ensure_root().await?;
        info!(path = %self.cache_dir.display(), "Reset disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    pub async fn current_size(&self) -> u64 {
        self.scan(SystemTime::now())
            .await
            .map(|files| files.iter().map(|f| f.size).sum())
            .unwrap_or(0)
    }

    /// Returns the number of cached files.
    pub async fn len(&self) -> usize {
        self.scan(SystemTime::now())
            .await
            .map_or(0, |files| files.len())
    }

    /// Returns true if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed cache file");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "pixfetch").map_or_else(
        || {
            std::env::temp_dir()
                .join("pixfetch")
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}
