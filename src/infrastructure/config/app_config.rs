//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::infrastructure::image::disk_cache::{
    DEFAULT_MAX_CACHE_SIZE, DEFAULT_TTL, default_cache_dir,
};
use crate::infrastructure::image::memory_cache::{DEFAULT_COST_LIMIT, DEFAULT_COUNT_LIMIT};
use crate::infrastructure::image::scheduler::DEFAULT_DECODE_CONCURRENCY;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Image loader settings.
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Image loader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Disk cache root. Defaults to the platform cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Disk cache file lifetime in seconds. 0 keeps files forever.
    #[serde(default = "default_file_cache_ttl_secs")]
    pub file_cache_ttl_secs: u64,

    /// Disk cache size limit in bytes. 0 is unbounded.
    #[serde(default = "default_file_cache_max_size")]
    pub file_cache_max_size: u64,

    /// Memory cache cost limit in bytes. 0 is unbounded.
    #[serde(default = "default_memory_cost_limit")]
    pub memory_cost_limit: u64,

    /// Memory cache entry limit. 0 is unbounded.
    #[serde(default = "default_memory_count_limit")]
    pub memory_count_limit: usize,

    /// Never read or write the memory cache.
    #[serde(default)]
    pub disable_memory_cache: bool,

    /// Never read or write the disk cache.
    #[serde(default)]
    pub disable_file_cache: bool,

    /// Decodes allowed to run at once.
    #[serde(default = "default_decode_concurrency")]
    pub decode_concurrency: usize,

    /// Per-request network timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Artificial pause after each decode, in milliseconds.
    #[serde(default)]
    pub debug_decode_delay_ms: u64,
}

impl LoaderConfig {
    /// Disk cache file lifetime.
    #[must_use]
    pub const fn file_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.file_cache_ttl_secs)
    }

    /// Network timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the configured cache root or the platform default.
    #[must_use]
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            file_cache_ttl_secs: default_file_cache_ttl_secs(),
            file_cache_max_size: default_file_cache_max_size(),
            memory_cost_limit: default_memory_cost_limit(),
            memory_count_limit: default_memory_count_limit(),
            disable_memory_cache: false,
            disable_file_cache: false,
            decode_concurrency: default_decode_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            debug_decode_delay_ms: 0,
        }
    }
}

const fn default_file_cache_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

const fn default_file_cache_max_size() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

const fn default_memory_cost_limit() -> u64 {
    DEFAULT_COST_LIMIT
}

const fn default_memory_count_limit() -> usize {
    DEFAULT_COUNT_LIMIT
}

const fn default_decode_concurrency() -> usize {
    DEFAULT_DECODE_CONCURRENCY
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.loader.cache_dir = Some(cache_dir.clone());
        }
        if let Some(ttl) = args.file_cache_ttl_secs {
            self.loader.file_cache_ttl_secs = ttl;
        }
        if let Some(max_size) = args.file_cache_max_size {
            self.loader.file_cache_max_size = max_size;
        }
        if let Some(concurrency) = args.decode_concurrency {
            self.loader.decode_concurrency = concurrency;
        }
        if let Some(timeout) = args.request_timeout_secs {
            self.loader.request_timeout_secs = timeout;
        }
        if args.disable_memory_cache {
            self.loader.disable_memory_cache = true;
        }
        if args.disable_file_cache {
            self.loader.disable_file_cache = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_loader_table() {
        let toml_content = r#"
            log_level = "debug"

            [loader]
            file_cache_ttl_secs = 60
            disable_memory_cache = true
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.loader.file_cache_ttl(), Duration::from_secs(60));
        assert!(config.loader.disable_memory_cache);
        assert_eq!(config.loader.memory_count_limit, 200);
        assert_eq!(config.loader.decode_concurrency, 4);
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.log_path.is_none());
        assert_eq!(config.loader.file_cache_ttl(), Duration::from_secs(3 * 86_400));
        assert_eq!(config.loader.file_cache_max_size, 1024 * 1024 * 1024);
        assert_eq!(config.loader.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.loader.debug_decode_delay_ms, 0);
    }

    #[test]
    fn test_empty_file_matches_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.loader, LoaderConfig::default());
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let mut config = AppConfig::default();
        let args = CliArgs::parse_from([
            "pixfetch",
            "--cache-dir",
            "/tmp/pixfetch-test",
            "--file-cache-max-size",
            "0",
            "--disable-file-cache",
            "clean",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.loader.effective_cache_dir(), PathBuf::from("/tmp/pixfetch-test"));
        assert_eq!(config.loader.file_cache_max_size, 0);
        assert!(config.loader.disable_file_cache);
        assert!(!config.loader.disable_memory_cache);
    }
}
