//! Run configuration.
//!
//! Settings come from three layers, highest precedence first:
//! command-line flags, an optional YAML file, built-in defaults.
//!
//! # File Format
//!
//! ```yaml
//! feed_url: https://feeds.elpais.com/mrss-s/pages/ep/site/elpais.com/section/internacional/portada
//! output: el_pais.epub
//! scratch_dir: .
//! timeout_secs: 30
//! utc: false
//! book:
//!   identifier: id123456
//!   title: El País Articles
//!   language: es
//!   author: RSS Feed Generator
//!   section: Articles
//! ```

use crate::cli::Cli;
use crate::models::BookMetadata;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

pub const DEFAULT_FEED_URL: &str =
    "https://feeds.elpais.com/mrss-s/pages/ep/site/elpais.com/section/internacional/portada";
pub const DEFAULT_OUTPUT: &str = "el_pais.epub";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Contents of the optional YAML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub feed_url: Option<String>,
    pub output: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub utc: Option<bool>,
    pub book: Option<BookFileConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookFileConfig {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub section: Option<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub feed_url: String,
    pub output: PathBuf,
    pub scratch_dir: PathBuf,
    pub timeout: Duration,
    /// Compare publication dates against the UTC date instead of the local one.
    pub utc: bool,
    pub book: BookMetadata,
}

/// Read and parse a YAML config file.
#[instrument(level = "info")]
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Loaded configuration file");
    Ok(parsed)
}

/// Merge CLI flags over the file config over defaults.
pub fn resolve(cli: &Cli, file: FileConfig) -> AppConfig {
    let defaults = BookMetadata::default();
    let book_file = file.book.unwrap_or_default();
    let pick = |flag: &Option<String>, from_file: Option<String>, default: String| {
        flag.clone().or(from_file).unwrap_or(default)
    };

    let book = BookMetadata {
        identifier: pick(&cli.identifier, book_file.identifier, defaults.identifier),
        title: pick(&cli.title, book_file.title, defaults.title),
        language: pick(&cli.language, book_file.language, defaults.language),
        author: pick(&cli.author, book_file.author, defaults.author),
        section: pick(&cli.section, book_file.section, defaults.section),
    };

    AppConfig {
        feed_url: pick(&cli.feed_url, file.feed_url, DEFAULT_FEED_URL.to_string()),
        output: cli
            .output
            .clone()
            .or(file.output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        scratch_dir: cli
            .scratch_dir
            .clone()
            .or(file.scratch_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        timeout: Duration::from_secs(
            cli.timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ),
        utc: cli.utc || file.utc.unwrap_or(false),
        book,
    }
}

/// Load the file named by `--config` (if any) and resolve the final settings.
pub fn load(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let file = match &cli.config {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };
    Ok(resolve(cli, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["feed_to_epub"]);
        let config = resolve(&cli, FileConfig::default());
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.output, PathBuf::from("el_pais.epub"));
        assert_eq!(config.scratch_dir, PathBuf::from("."));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.utc);
        assert_eq!(config.book, BookMetadata::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "feed_url: https://file.example/rss\noutput: file.epub\nutc: true\nbook:\n  title: From File\n  language: en"
        )
        .unwrap();

        let path = tmp.path().to_str().unwrap().to_string();
        let cli = Cli::parse_from(["feed_to_epub", "--config", &path, "--title", "From CLI"]);
        let config = load(&cli).unwrap();

        assert_eq!(config.feed_url, "https://file.example/rss");
        assert_eq!(config.output, PathBuf::from("file.epub"));
        assert!(config.utc);
        assert_eq!(config.book.title, "From CLI");
        assert_eq!(config.book.language, "en");
        assert_eq!(config.book.author, "RSS Feed Generator");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "feed: https://typo.example/rss").unwrap();
        let err = load_file(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
