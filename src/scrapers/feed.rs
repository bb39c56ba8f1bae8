//! RSS feed parsing.
//!
//! The feed is an RSS 2.0 document whose `<item>` entries carry a `<link>`
//! and one or more `<category>` elements. Only those two fields are read.
//! Namespaced extensions such as `atom:link` or `media:category` are kept
//! apart by the parser and never mistaken for them.

use crate::models::FeedItem;
use crate::utils::truncate_for_log;
use feed_rs::parser::{self, ParseFeedError};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The feed document could not be read as RSS.
#[derive(Debug, Error)]
#[error("feed is not valid RSS: {0}")]
pub struct FeedParseError(#[from] ParseFeedError);

/// Parse an RSS document into feed items, in document order.
///
/// Items without a link are dropped with a warning. The first category of
/// each item is kept; a missing category becomes the empty string.
#[instrument(level = "info", skip_all, fields(bytes = bytes.len()))]
pub fn parse(bytes: &[u8]) -> Result<Vec<FeedItem>, FeedParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let feed = parser::parse(bytes).map_err(|e| {
        let text = String::from_utf8_lossy(bytes);
        error!(error = %e, preview = %truncate_for_log(&text, 300), "Feed document is not RSS");
        e
    })?;

    let total = feed.entries.len();
    let items: Vec<FeedItem> = feed
        .entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|l| !l.is_empty());
            let Some(url) = url else {
                warn!(index = i, "Feed item has no link; skipping");
                return None;
            };
            let category = entry
                .categories
                .first()
                .map(|c| c.term.trim().to_string())
                .unwrap_or_default();
            Some(FeedItem { url, category })
        })
        .collect();

    info!(total, kept = items.len(), "Parsed feed items");
    debug!(items = ?items, "Feed items");
    Ok(items)
}

/// Order items by category, descending. Ties keep their feed order.
pub fn sort_by_category_desc(items: &mut [FeedItem]) {
    items.sort_by(|a, b| b.category.cmp(&a.category));
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Internacional</title>
    <link>https://elpais.com/internacional/</link>
    <atom:link href="https://feeds.example.com/rss" rel="self" type="application/rss+xml"/>
    <item>
      <title>Primera</title>
      <link>https://elpais.com/a.html</link>
      <category domain="section">Europa</category>
      <category>Francia</category>
      <media:content url="https://img.example.com/a.jpg" medium="image"/>
    </item>
    <item>
      <title>Segunda</title>
      <link><![CDATA[https://elpais.com/b.html]]></link>
      <category><![CDATA[América]]></category>
    </item>
    <item>
      <title>Sin enlace</title>
      <category>Asia</category>
    </item>
    <item>
      <link>https://elpais.com/c.html</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_links_and_categories() {
        let items = parse(FEED.as_bytes()).unwrap();
        assert_eq!(
            items,
            vec![
                FeedItem {
                    url: "https://elpais.com/a.html".into(),
                    category: "Europa".into()
                },
                FeedItem {
                    url: "https://elpais.com/b.html".into(),
                    category: "América".into()
                },
                FeedItem {
                    url: "https://elpais.com/c.html".into(),
                    category: "".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_channel() {
        let items = parse(b"<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_rss() {
        assert!(parse(b"<html><body>nope</body></html>").is_err());
        assert!(parse(b"not xml at all").is_err());
    }

    #[test]
    fn test_parse_ignores_namespaced_link_and_category() {
        let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Internacional</title>
    <item>
      <link>https://elpais.com/1.html</link>
      <atom:link href="https://elpais.com/1.amp.html" rel="amphtml"/>
      <category>Asia</category>
    </item>
    <item>
      <link>https://elpais.com/2.html</link>
      <media:category scheme="urn:elpais">photo/news</media:category>
      <category>Europa</category>
    </item>
  </channel>
</rss>"#;
        let items = parse(feed.as_bytes()).unwrap();
        assert_eq!(
            items,
            vec![
                FeedItem {
                    url: "https://elpais.com/1.html".into(),
                    category: "Asia".into()
                },
                FeedItem {
                    url: "https://elpais.com/2.html".into(),
                    category: "Europa".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_strips_byte_order_mark() {
        let feed = "\u{FEFF}<rss><channel><title>x</title><item><link>https://elpais.com/a.html</link></item></channel></rss>";
        let items = parse(feed.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_sort_by_category_desc_is_stable() {
        let mut items = vec![
            FeedItem { url: "1".into(), category: "B".into() },
            FeedItem { url: "2".into(), category: "C".into() },
            FeedItem { url: "3".into(), category: "B".into() },
            FeedItem { url: "4".into(), category: "A".into() },
        ];
        sort_by_category_desc(&mut items);
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["2", "1", "3", "4"]);
    }
}
