//! Feed-to-book pipeline.
//!
//! The [`Assembler`] fetches the feed, walks its items one at a time and
//! builds an [`Archive`] of chapters, then serializes it to the output path.
//!
//! # Failure Policy
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | feed unreachable after retries | run fails, no file written |
//! | feed is not RSS | run fails, no file written |
//! | article extraction exhausted | item skipped (ERROR logged) |
//! | article not published today | item skipped (DEBUG logged) |
//! | chapter build error | item skipped (ERROR logged) |
//! | image capture failed | chapter kept, without image |
//! | zero chapters | run fails, no file written |
//! | serialization / write error | run fails |

use crate::api::{Fetch, FetchError, RetryPolicy};
use crate::images::{IMAGE_MEDIA_TYPE, ImageCapture};
use crate::models::{ArticleRecord, BookMetadata, Chapter, EmbeddedImage, FeedItem};
use crate::normalize::normalize;
use crate::outputs::epub::{
    self, EpubError, EpubItem, NAV_ID, NavPoint, STYLE_HREF, STYLESHEET, TocSection,
};
use crate::scrapers::article::{ArticleSource, extract_with_retry};
use crate::scrapers::feed::{self, FeedParseError};
use crate::utils::{Clock, chapter_file_name};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// Errors that end a run without producing a book.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to fetch RSS feed: {0}")]
    FeedUnreachable(#[source] FetchError),
    #[error(transparent)]
    FeedParse(#[from] FeedParseError),
    #[error("no articles were successfully processed")]
    NoChapters,
    #[error("error writing EPUB file: {0}")]
    Write(#[source] ArchiveError),
}

/// Errors raised while building or serializing the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive already has an entry named {0}")]
    DuplicateEntry(String),
    #[error("archive has no chapters")]
    Empty,
    #[error(transparent)]
    Epub(#[from] EpubError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    /// Chapter titles in book order.
    pub chapters: Vec<String>,
    /// Items dropped because extraction or chapter building failed.
    pub skipped_failed: usize,
    /// Items dropped because they were not published today.
    pub skipped_stale: usize,
}

/// The book under construction.
///
/// Chapters keep their insertion order, which is also the table-of-contents
/// and reading order. Entry names are unique across chapters and images.
#[derive(Debug)]
pub struct Archive {
    metadata: BookMetadata,
    items: Vec<EpubItem>,
    chapters: Vec<NavPoint>,
    chapter_ids: Vec<String>,
    entry_names: HashSet<String>,
}

impl Archive {
    pub fn new(metadata: BookMetadata) -> Self {
        let mut entry_names = HashSet::new();
        for reserved in ["content.opf", "toc.ncx", epub::NAV_HREF, STYLE_HREF] {
            entry_names.insert(reserved.to_string());
        }
        Self {
            metadata,
            items: Vec::new(),
            chapters: Vec::new(),
            chapter_ids: Vec::new(),
            entry_names,
        }
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    /// Chapter titles in insertion order.
    pub fn chapter_titles(&self) -> Vec<String> {
        self.chapters.iter().map(|c| c.title.clone()).collect()
    }

    /// Register a chapter and, if present, its image bytes.
    ///
    /// Nothing is registered when an entry name is already taken.
    pub fn add_chapter(&mut self, chapter: &Chapter, image_bytes: Option<Vec<u8>>) -> Result<(), ArchiveError> {
        if self.entry_names.contains(&chapter.file_name) {
            return Err(ArchiveError::DuplicateEntry(chapter.file_name.clone()));
        }
        let image = match (&chapter.embedded_image, image_bytes) {
            (Some(image), Some(bytes)) => {
                if self.entry_names.contains(&image.file_name) || image.file_name == chapter.file_name {
                    return Err(ArchiveError::DuplicateEntry(image.file_name.clone()));
                }
                Some((image, bytes))
            }
            _ => None,
        };

        let xhtml = epub::render_chapter(chapter, &self.metadata.language)?;
        let n = self.chapters.len() + 1;

        if let Some((image, bytes)) = image {
            self.entry_names.insert(image.file_name.clone());
            self.items.push(EpubItem {
                id: format!("image_{n}"),
                href: image.file_name.clone(),
                media_type: image.media_type.clone(),
                content: bytes,
            });
        }

        let id = format!("chapter_{n}");
        self.entry_names.insert(chapter.file_name.clone());
        self.items.push(EpubItem {
            id: id.clone(),
            href: chapter.file_name.clone(),
            media_type: "application/xhtml+xml".to_string(),
            content: xhtml,
        });
        self.chapter_ids.push(id);
        self.chapters.push(NavPoint {
            title: chapter.title.clone(),
            href: chapter.file_name.clone(),
        });
        Ok(())
    }

    /// Serialize the finished book. Requires at least one chapter.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        if self.chapters.is_empty() {
            return Err(ArchiveError::Empty);
        }
        let mut items = self.items.clone();
        items.push(EpubItem {
            id: "style_nav".to_string(),
            href: STYLE_HREF.to_string(),
            media_type: "text/css".to_string(),
            content: STYLESHEET.as_bytes().to_vec(),
        });

        let spine: Vec<String> = std::iter::once(NAV_ID.to_string())
            .chain(self.chapter_ids.iter().cloned())
            .collect();
        let toc = TocSection {
            title: self.metadata.section.clone(),
            entries: self.chapters.clone(),
        };
        Ok(epub::write_epub_to_vec(&self.metadata, &items, &spine, &toc)?)
    }

    /// Serialize and write to `path`. A partially written file is removed.
    pub async fn write_to(&self, path: &Path) -> Result<(), ArchiveError> {
        let bytes = self.to_bytes()?;
        if let Err(e) = fs::write(path, &bytes).await {
            let _ = fs::remove_file(path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Drives one feed-to-book run.
pub struct Assembler<'a, F, S> {
    pub feed_fetcher: &'a F,
    pub articles: &'a S,
    pub images: &'a ImageCapture,
    pub clock: &'a dyn Clock,
    pub metadata: BookMetadata,
    pub article_policy: RetryPolicy,
}

impl<'a, F: Fetch, S: ArticleSource> Assembler<'a, F, S> {
    /// Run the whole pipeline and write the book to `output`.
    #[instrument(level = "info", skip(self, output), fields(output = %output.display()))]
    pub async fn run(&self, feed_url: &str, output: &Path) -> Result<RunSummary, RunError> {
        let body = self.feed_fetcher.fetch(feed_url).await.map_err(|e| {
            error!(%feed_url, error = %e, "Failed to fetch RSS feed");
            RunError::FeedUnreachable(e)
        })?;

        let mut items = feed::parse(&body).map_err(|e| {
            error!(error = %e, "Failed to parse RSS feed");
            RunError::from(e)
        })?;
        feed::sort_by_category_desc(&mut items);
        let total = items.len();
        info!(count = total, "Found articles");

        let today = self.clock.today();
        let mut archive = Archive::new(self.metadata.clone());
        let mut skipped_failed = 0;
        let mut skipped_stale = 0;

        for (i, item) in items.iter().enumerate() {
            let Some(record) = extract_with_retry(self.articles, &item.url, self.article_policy).await else {
                warn!(index = i, total, url = %item.url, "Skipping article");
                skipped_failed += 1;
                continue;
            };

            if record.publish_date != today {
                debug!(index = i, url = %item.url, published = %record.publish_date, %today, "Not published today; skipping");
                skipped_stale += 1;
                continue;
            }

            match self.add_article(&mut archive, item, record).await {
                Ok(()) => info!(index = i, total, url = %item.url, chapters = archive.chapter_count(), "Added chapter"),
                Err(e) => {
                    error!(index = i, total, url = %item.url, error = %e, "Error processing article");
                    skipped_failed += 1;
                }
            }
        }

        if archive.chapter_count() == 0 {
            error!(skipped_failed, skipped_stale, "No articles were successfully processed");
            return Err(RunError::NoChapters);
        }

        if let Err(e) = archive.write_to(output).await {
            error!(error = %e, "Error writing EPUB file");
            return Err(RunError::Write(e));
        }

        let summary = RunSummary {
            output: output.to_path_buf(),
            chapters: archive.chapter_titles(),
            skipped_failed,
            skipped_stale,
        };
        info!(
            chapters = summary.chapters.len(),
            skipped_failed, skipped_stale, "EPUB file generated successfully"
        );
        Ok(summary)
    }

    /// Normalize, capture the lead image and register one chapter.
    async fn add_article(
        &self,
        archive: &mut Archive,
        item: &FeedItem,
        record: ArticleRecord,
    ) -> Result<(), ArchiveError> {
        let html_content = normalize(&record);

        let captured = match record.lead_image_url.as_deref() {
            Some(url) => self.images.capture(url).await,
            None => None,
        };
        let (embedded_image, image_bytes) = match captured {
            Some(scratch) => {
                let image = EmbeddedImage {
                    file_name: scratch.file_name,
                    local_path: scratch.path,
                    media_type: IMAGE_MEDIA_TYPE.to_string(),
                };
                match fs::read(&image.local_path).await {
                    Ok(bytes) => (Some(image), Some(bytes)),
                    Err(e) => {
                        warn!(path = %image.local_path.display(), error = %e, "Captured image unreadable; omitting");
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        let chapter = Chapter {
            file_name: chapter_file_name(&record.title),
            title: record.title,
            category: item.category.clone(),
            html_content,
            embedded_image,
        };
        archive.add_chapter(&chapter, image_bytes)
    }
}
