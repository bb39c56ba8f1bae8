//! Utility functions for dates, file naming, logging and scratch-file housekeeping.
//!
//! This module provides helpers used throughout the application:
//! - The [`Clock`] abstraction deciding what "today" means for the date filter
//! - Archive-safe chapter file names
//! - String truncation for log previews
//! - Output directory validation and scratch-file sweeping

use chrono::{Local, NaiveDate, Utc};
use std::error::Error;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Maximum number of characters kept from a title when naming a chapter file.
pub const CHAPTER_NAME_MAX_CHARS: usize = 30;

/// Source of the current calendar date.
///
/// The assembler keeps an article only when its publication date equals
/// [`Clock::today`].
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// The machine's local calendar date.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// The current calendar date in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock pinned to one date.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

#[cfg(test)]
impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to the previous
/// character boundary) with an ellipsis and byte count appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Derive an archive-safe chapter file name from an article title.
///
/// Spaces and `/` become `_`, as do characters that are unsafe in a zip
/// entry name. The stem keeps at most [`CHAPTER_NAME_MAX_CHARS`] characters
/// and gets an `.xhtml` extension. Distinct titles may map to the same name;
/// callers decide what a collision means.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(chapter_file_name("Hello World"), "Hello_World.xhtml");
/// assert_eq!(chapter_file_name("A/B"), "A_B.xhtml");
/// ```
pub fn chapter_file_name(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '%' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(CHAPTER_NAME_MAX_CHARS)
        .collect();

    if stem.trim_matches('_').is_empty() {
        "chapter.xhtml".to_string()
    } else {
        format!("{stem}.xhtml")
    }
}

/// Ensure the directory that will hold `output` exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub async fn ensure_writable_parent(output: &Path) -> Result<(), Box<dyn Error>> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).await?;

    let probe_path = dir.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!(dir = %dir.display(), "Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Delete the scratch files created during a run.
///
/// Failures are logged and otherwise ignored; returns how many files were removed.
#[instrument(level = "info", skip_all, fields(count = paths.len()))]
pub async fn sweep_scratch_files(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => {
                removed += 1;
                debug!(path = %path.display(), "Removed scratch file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove scratch file"),
        }
    }
    info!(removed, "Swept scratch files");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "ñññññ";
        let result = truncate_for_log(s, 3);
        assert!(result.starts_with('ñ'));
        assert!(result.contains("(+8 bytes)"));
    }

    #[test]
    fn test_chapter_file_name_replaces_spaces_and_slashes() {
        assert_eq!(chapter_file_name("Hello World"), "Hello_World.xhtml");
        assert_eq!(chapter_file_name("Guerra 24/7"), "Guerra_24_7.xhtml");
        assert_eq!(chapter_file_name("¿Qué pasa?"), "¿Qué_pasa_.xhtml");
    }

    #[test]
    fn test_chapter_file_name_truncates() {
        let title = "Una noticia con un titular larguísimo que no cabe";
        let name = chapter_file_name(title);
        let stem = name.strip_suffix(".xhtml").unwrap();
        assert_eq!(stem.chars().count(), CHAPTER_NAME_MAX_CHARS);
        assert_eq!(stem, "Una_noticia_con_un_titular_lar");
    }

    #[test]
    fn test_chapter_file_name_empty_title() {
        assert_eq!(chapter_file_name(""), "chapter.xhtml");
        assert_eq!(chapter_file_name("  /  "), "chapter.xhtml");
    }

    #[test]
    fn test_fixed_clock() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        assert_eq!(FixedClock(date).today(), date);
    }

    #[tokio::test]
    async fn test_sweep_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("aaaaaaaaaa.jpeg");
        let b = dir.path().join("bbbbbbbbbb.jpeg");
        stdfs::write(&a, b"x").unwrap();
        let missing = dir.path().join("missing.jpeg");

        let removed = sweep_scratch_files(&[a.clone(), missing, b.clone()]).await;
        assert_eq!(removed, 1);
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn test_ensure_writable_parent_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("book.epub");
        ensure_writable_parent(&output).await.unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
