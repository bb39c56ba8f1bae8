//! # feed_to_epub
//!
//! Builds a single EPUB from the articles an RSS feed published today.
//!
//! ## Usage
//!
//! ```sh
//! feed_to_epub -o el_pais.epub
//! ```
//!
//! ## Architecture
//!
//! The run is one sequential pipeline:
//! 1. **Feed**: fetch the RSS document with retry, parse `(link, category)` pairs,
//!    sort by category descending
//! 2. **Articles**: fetch and parse each page (own retry policy), keep today's
//! 3. **Chapters**: flatten the body into paragraphs, capture the lead image
//! 4. **Output**: write the EPUB, then sweep the scratch images
//!
//! One article failing never stops the run. The run fails only when the feed
//! cannot be fetched or parsed, no chapter was built, or the book cannot be
//! written; the process exit status reports which.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod assembler;
mod cli;
mod config;
mod images;
mod models;
mod normalize;
mod outputs;
mod scrapers;
mod utils;

use api::{HttpFetch, RetryFetch, RetryPolicy};
use assembler::Assembler;
use cli::Cli;
use images::{ImageCapture, RandomNames};
use scrapers::article::HtmlArticleSource;
use utils::{Clock, LocalClock, UtcClock, ensure_writable_parent, sweep_scratch_files};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
#[instrument]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_to_epub starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = match config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(feed_url = %config.feed_url, output = %config.output.display(), utc = config.utc, "Configuration resolved");

    if let Err(e) = ensure_writable_parent(&config.output).await {
        error!(
            path = %config.output.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return ExitCode::FAILURE;
    }
    if let Err(e) = tokio::fs::create_dir_all(&config.scratch_dir).await {
        error!(path = %config.scratch_dir.display(), error = %e, "Could not create scratch directory");
        return ExitCode::FAILURE;
    }

    let client = match reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(USER_AGENT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let feed_fetcher = RetryFetch::new(HttpFetch::new(client.clone()), RetryPolicy::FEED);
    let articles = HtmlArticleSource::new(HttpFetch::new(client.clone()));
    let images = ImageCapture::new(client, config.scratch_dir.clone(), Box::new(RandomNames));
    let clock: Box<dyn Clock> = if config.utc {
        Box::new(UtcClock)
    } else {
        Box::new(LocalClock)
    };

    let assembler = Assembler {
        feed_fetcher: &feed_fetcher,
        articles: &articles,
        images: &images,
        clock: clock.as_ref(),
        metadata: config.book.clone(),
        article_policy: RetryPolicy::ARTICLE,
    };
    let result = assembler.run(&config.feed_url, &config.output).await;

    sweep_scratch_files(&images.scratch_files()).await;

    let elapsed = start_time.elapsed();
    match result {
        Ok(summary) => {
            info!(
                ?elapsed,
                output = %summary.output.display(),
                chapters = summary.chapters.len(),
                skipped_failed = summary.skipped_failed,
                skipped_stale = summary.skipped_stale,
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(?elapsed, error = %e, "Run failed; no book written");
            ExitCode::FAILURE
        }
    }
}
