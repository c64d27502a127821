//! Reading and writing the loader's `config.toml`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Failure to locate, read or write the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No per-user configuration directory exists on this platform.
    #[error("no configuration directory available for pixfetch")]
    NoConfigDir,
    /// Reading or writing `path` failed.
    #[error("config file {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration could not be rendered as TOML.
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Location of the configuration file and the operations on it.
///
/// A missing file is replaced by the defaults, which are written back so the
/// user has something to edit. A malformed file is left untouched and the
/// defaults are used for this run.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Uses the platform configuration directory for pixfetch.
    ///
    /// # Errors
    /// Returns `ConfigError::NoConfigDir` when the platform has none.
    pub fn open() -> Result<Self, ConfigError> {
        ProjectDirs::from("com", "linuxmobile", "pixfetch")
            .map(|dirs| Self::at(dirs.config_dir()))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Uses `dir` as the configuration directory.
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Configuration directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the default configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Loads `path`, or the default file when `path` is `None`.
    ///
    /// # Errors
    /// Returns `ConfigError` if an existing file cannot be read or a missing
    /// one cannot be created.
    pub fn load(&self, path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let path = path.map_or_else(|| self.config_path(), Path::to_path_buf);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Writing default configuration");
                let config = AppConfig::default();
                write_atomic(&path, &config)?;
                return Ok(config);
            }
            Err(e) => return Err(ConfigError::io(&path, e)),
        };

        toml::from_str(&content).or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring malformed configuration");
            Ok(AppConfig::default())
        })
    }

    /// Writes `config` to the default file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be written.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        write_atomic(&self.config_path(), config)
    }
}

/// Replaces `path` with `config` through a sibling temp file so readers
/// never see a partial write.
fn write_atomic(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;

    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(dir, e))?;
    staged
        .write_all(content.as_bytes())
        .map_err(|e| ConfigError::io(staged.path(), e))?;
    staged
        .persist(path)
        .map_err(|e| ConfigError::io(path, e.error))?;

    debug!(path = %path.display(), "Configuration saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_and_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::at(temp_dir.path().join("pixfetch"));

        let config = store.load(None).unwrap();

        assert_eq!(config.loader.memory_count_limit, 200);
        let written: AppConfig =
            toml::from_str(&fs::read_to_string(store.config_path()).unwrap()).unwrap();
        assert_eq!(written.loader, config.loader);
    }

    #[test]
    fn test_malformed_file_is_kept_and_defaults_used() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::at(temp_dir.path());
        fs::write(store.config_path(), "[loader\ndecode_concurrency = ").unwrap();

        let config = store.load(None).unwrap();

        assert_eq!(config.loader.decode_concurrency, 4);
        assert_eq!(
            fs::read_to_string(store.config_path()).unwrap(),
            "[loader\ndecode_concurrency = "
        );
    }

    #[test]
    fn test_explicit_path_wins_over_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::at(temp_dir.path().join("unused"));
        let custom = temp_dir.path().join("images.toml");
        fs::write(&custom, "[loader]\ndecode_concurrency = 9\n").unwrap();

        let config = store.load(Some(&custom)).unwrap();

        assert_eq!(config.loader.decode_concurrency, 9);
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_saved_loader_settings_reload() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::at(temp_dir.path().join("nested"));
        let mut config = AppConfig::default();
        config.log_level = LogLevel::Trace;
        config.loader.file_cache_ttl_secs = 0;
        config.loader.disable_memory_cache = true;

        store.save(&config).unwrap();
        let loaded = store.load(None).unwrap();

        assert_eq!(loaded.log_level, LogLevel::Trace);
        assert_eq!(loaded.loader, config.loader);
        // only the config itself, no leftover temp file
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_unreadable_path_reports_it() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::at(temp_dir.path());

        let err = store.load(Some(temp_dir.path())).unwrap_err();

        assert!(matches!(err, ConfigError::Io { ref path, .. } if path == temp_dir.path()));
    }
}
