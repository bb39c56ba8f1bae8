//! Command-line interface definitions for feed_to_epub.
//!
//! Every option is optional: anything left unset falls back to the config
//! file (`--config`) and then to built-in defaults.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for feed_to_epub.
///
/// # Examples
///
/// ```sh
/// # Default feed, writes ./el_pais.epub
/// feed_to_epub
///
/// # Another feed and output file
/// feed_to_epub --feed-url https://example.com/rss -o today.epub
///
/// # Settings from a YAML file, dates compared in UTC
/// feed_to_epub -c feed.yaml --utc
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// RSS feed to turn into a book
    #[arg(short, long, env = "FEED_TO_EPUB_URL")]
    pub feed_url: Option<String>,

    /// Path of the EPUB file to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for downloaded images while the book is built
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Treat "today" as the current UTC date instead of the local date
    #[arg(long)]
    pub utc: bool,

    /// Book title
    #[arg(long)]
    pub title: Option<String>,

    /// Book language code (e.g. `es`)
    #[arg(long)]
    pub language: Option<String>,

    /// Book author
    #[arg(long)]
    pub author: Option<String>,

    /// Unique identifier of the book
    #[arg(long)]
    pub identifier: Option<String>,

    /// Name of the table-of-contents section holding the articles
    #[arg(long)]
    pub section: Option<String>,
}
