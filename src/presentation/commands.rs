//! Command-line command execution and reporting.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::application::{FetchImagesRequest, FetchImagesUseCase};
use crate::domain::errors::{CacheError, CacheResult};
use crate::infrastructure::config::{Command, FetchArgs};
use crate::infrastructure::image::ImageLoader;

impl From<FetchArgs> for FetchImagesRequest {
    fn from(args: FetchArgs) -> Self {
        Self {
            urls: args.urls,
            size: args.width.zip(args.height),
            headers: args.headers,
            no_cache: args.no_cache,
            output_dir: args.output,
        }
    }
}

/// Runs `command`, writing a human-readable report to `out`.
///
/// Returns false if any requested image failed to load.
///
/// # Errors
/// Returns error if cache maintenance fails or `out` cannot be written.
pub async fn run_command<W: Write>(
    command: Command,
    loader: Arc<ImageLoader>,
    out: &mut W,
) -> CacheResult<bool> {
    debug!(?command, "Running command");
    match command {
        Command::Fetch(args) => {
            let outcomes = FetchImagesUseCase::new(loader).execute(args.into()).await;
            for outcome in &outcomes {
                writeln!(out, "{outcome}").map_err(|e| CacheError::io("Failed to write report", &e))?;
            }
            Ok(outcomes.iter().all(|o| o.is_success()))
        }
        Command::Clean => {
            let report = loader.clean_cache().await?;
            writeln!(out, "Cache cleaned: {report}")
                .map_err(|e| CacheError::io("Failed to write report", &e))?;
            Ok(true)
        }
        Command::Reset => {
            loader.reset().await?;
            writeln!(out, "Cache reset: {}", loader.disk_cache().cache_dir().display())
                .map_err(|e| CacheError::io("Failed to write report", &e))?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::StubTransport;
    use crate::infrastructure::config::LoaderConfig;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    async fn loader(status: u16, temp_dir: &TempDir) -> Arc<ImageLoader> {
        let config = LoaderConfig {
            cache_dir: Some(temp_dir.path().join("images")),
            ..LoaderConfig::default()
        };
        let transport = Arc::new(StubTransport::ok(status, png_bytes()));
        Arc::new(ImageLoader::new(config, transport).await.unwrap())
    }

    fn fetch(urls: &[&str]) -> Command {
        Command::Fetch(FetchArgs {
            urls: urls.iter().map(ToString::to_string).collect(),
            width: None,
            height: None,
            no_cache: false,
            headers: Vec::new(),
            output: None,
        })
    }

    #[tokio::test]
    async fn test_fetch_reports_each_url() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader(200, &temp_dir).await;
        let mut out = Vec::new();

        let ok = run_command(fetch(&["https://a/1.png", "https://a/2.png"]), loader, &mut out)
            .await
            .unwrap();

        let report = String::from_utf8(out).unwrap();
        assert!(ok);
        assert_eq!(report.lines().count(), 2);
        assert!(report.contains("https://a/1.png [network] 2x2"));
    }

    #[tokio::test]
    async fn test_fetch_failure_reported() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader(404, &temp_dir).await;
        let mut out = Vec::new();

        let ok = run_command(fetch(&["https://a/1.png"]), loader, &mut out).await.unwrap();

        assert!(!ok);
        assert!(String::from_utf8(out).unwrap().contains("[download failed]"));
    }

    #[tokio::test]
    async fn test_clean_and_reset() {
        let temp_dir = TempDir::new().unwrap();
        let loader = loader(200, &temp_dir).await;
        loader.get("https://a/1.png").wait().await.unwrap();

        let mut out = Vec::new();
        assert!(run_command(Command::Clean, loader.clone(), &mut out).await.unwrap());
        assert!(run_command(Command::Reset, loader.clone(), &mut out).await.unwrap());

        let report = String::from_utf8(out).unwrap();
        assert!(report.starts_with("Cache cleaned: expired 0, evicted 0"));
        assert!(report.contains("Cache reset:"));
        assert!(loader.disk_cache().is_empty().await);
    }
}
