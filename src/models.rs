//! Data models for feed entries, extracted articles and the chapters built from them.
//!
//! This module defines the records that flow through the pipeline:
//! - [`FeedItem`]: one `(link, category)` pair read from the feed
//! - [`ArticleRecord`]: the normalized result of fetching and parsing one article page
//! - [`Chapter`]: one article ready to be written into the book
//! - [`ScratchImage`]: a downloaded lead image living in the scratch directory
//! - [`BookMetadata`]: identifier, title, language and author of the output book

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single entry discovered in the RSS feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Absolute URL of the article page.
    pub url: String,
    /// Feed category of the entry; empty when the feed gives none.
    pub category: String,
}

/// An article page after a successful fetch and parse.
///
/// Records are transient: the assembler consumes each one right after the
/// extractor returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    /// Headline of the article.
    pub title: String,
    /// Inner HTML of the main content node, when the page has one.
    pub body_html: Option<String>,
    /// Plain text of the article with paragraphs separated by blank lines.
    pub body_text: String,
    /// Calendar date of publication, in the publisher's own offset.
    pub publish_date: NaiveDate,
    /// Absolute URL of the lead image, if the page advertises one.
    pub lead_image_url: Option<String>,
}

/// A downloaded image written to the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchImage {
    /// The random file name, extension included (e.g. `qWeRtYuIoP.jpeg`).
    pub file_name: String,
    /// Full path of the file on disk.
    pub path: PathBuf,
}

/// An image to embed in the book next to its chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    /// Entry name inside the book, relative to the content directory.
    pub file_name: String,
    /// Local file holding the image bytes.
    pub local_path: PathBuf,
    /// MIME type declared in the package manifest.
    pub media_type: String,
}

/// One successfully processed article.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub title: String,
    /// Archive-safe entry name derived from the title, ending in `.xhtml`.
    pub file_name: String,
    /// Section heading shown under the title.
    pub category: String,
    /// Flat sequence of `<p>` elements.
    pub html_content: String,
    pub embedded_image: Option<EmbeddedImage>,
}

/// Package-level metadata of the output book.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BookMetadata {
    pub identifier: String,
    pub title: String,
    /// BCP 47 language code, e.g. `es`.
    pub language: String,
    pub author: String,
    /// Name of the single table-of-contents section holding every chapter.
    pub section: String,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            identifier: "id123456".to_string(),
            title: "El País Articles".to_string(),
            language: "es".to_string(),
            author: "RSS Feed Generator".to_string(),
            section: "Articles".to_string(),
        }
    }
}
