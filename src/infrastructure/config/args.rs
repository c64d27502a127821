use super::app_config::LogLevel;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pixfetch",
    version,
    about = "Fetch images through a memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Disk cache file lifetime in seconds (0 keeps files forever).
    #[arg(long, global = true)]
    pub file_cache_ttl_secs: Option<u64>,

    /// Disk cache size limit in bytes (0 is unbounded).
    #[arg(long, global = true)]
    pub file_cache_max_size: Option<u64>,

    /// Decodes allowed to run at once.
    #[arg(long, global = true)]
    pub decode_concurrency: Option<usize>,

    /// Per-request network timeout in seconds.
    #[arg(long, global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Never read or write the memory cache.
    #[arg(long, global = true)]
    pub disable_memory_cache: bool,

    /// Never read or write the disk cache.
    #[arg(long, global = true)]
    pub disable_file_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load images and report where each one came from.
    Fetch(FetchArgs),
    /// Sweep expired files and trim the disk cache to its size limit.
    Clean,
    /// Delete every cached image.
    Reset,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Image URLs.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Resize to this width (aspect fill).
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Resize to this height (aspect fill).
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Bypass both cache tiers.
    #[arg(long)]
    pub no_cache: bool,

    /// Extra request header, repeatable.
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Write the first frame of each image here as PNG.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_command() {
        let args = CliArgs::parse_from([
            "pixfetch",
            "fetch",
            "https://example.com/a.png",
            "https://example.com/b.gif",
            "--width",
            "64",
            "--height",
            "32",
            "--header",
            "Referer: https://example.com",
        ]);

        let Command::Fetch(fetch) = args.command else {
            panic!("expected fetch command");
        };
        assert_eq!(fetch.urls.len(), 2);
        assert_eq!((fetch.width, fetch.height), (Some(64), Some(32)));
        assert_eq!(
            fetch.headers,
            vec![("Referer".to_string(), "https://example.com".to_string())]
        );
        assert!(!fetch.no_cache);
    }

    #[test]
    fn test_width_requires_height() {
        let result = CliArgs::try_parse_from(["pixfetch", "fetch", "u", "--width", "10"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_header_rejects_missing_colon() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(":value").is_err());
        assert_eq!(
            parse_header("Accept:image/*"),
            Ok(("Accept".to_string(), "image/*".to_string()))
        );
    }
}
