//! Reading the source site: the RSS feed and the article pages it links to.
//!
//! # Submodules
//!
//! | Module | Input | Output |
//! |--------|-------|--------|
//! | [`feed`] | RSS document bytes | `Vec<FeedItem>` |
//! | [`article`] | article URL | `ArticleRecord` (or `None` after retries) |
//!
//! Both follow the same pattern: network errors and parse errors are typed,
//! and only the caller decides whether a failure skips an item or ends the run.

pub mod article;
pub mod feed;
