//! Article page extraction.
//!
//! [`HtmlArticleSource`] downloads one article page and pulls out the
//! headline, publication date, lead image and body. [`extract_with_retry`]
//! wraps any [`ArticleSource`] in the article retry policy and turns a
//! definitive failure into `None`, which callers treat as "skip this item".
//!
//! # Field Sources
//!
//! | Field | Tried in order |
//! |-------|----------------|
//! | title | `og:title`, first `<h1>`, `<title>` |
//! | publish date | date meta tags, `itemprop=datePublished`, JSON-LD `datePublished`, `<time datetime>` |
//! | lead image | `og:image`, `twitter:image` |
//! | body HTML | `<article>`, `[itemprop=articleBody]`, `<main>` |

use crate::api::{Fetch, FetchError, RetryPolicy};
use crate::models::ArticleRecord;
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use std::time::Instant;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static META_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static META_DATE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"meta[property="article:published_time"], meta[property="og:published_time"], meta[name="datePublished"], meta[name="date"], meta[itemprop="datePublished"]"#,
    )
    .unwrap()
});
static ITEMPROP_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="datePublished"]"#).unwrap());
static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static META_IMAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:image"], meta[name="twitter:image"], meta[property="twitter:image"]"#)
        .unwrap()
});
static CONTENT_ROOTS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        Selector::parse("article").unwrap(),
        Selector::parse(r#"[itemprop="articleBody"]"#).unwrap(),
        Selector::parse("main").unwrap(),
    ]
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Errors raised while fetching or parsing an article page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("page has no title")]
    MissingTitle,
    #[error("page has no recognizable publication date")]
    MissingPublishDate,
}

/// Trait for anything that can turn an article URL into an [`ArticleRecord`].
pub trait ArticleSource {
    async fn fetch_and_parse(&self, url: &str) -> Result<ArticleRecord, ExtractError>;
}

/// Extracts articles from plain HTML pages fetched with `F`.
#[derive(Debug, Clone)]
pub struct HtmlArticleSource<F> {
    fetcher: F,
}

impl<F: Fetch> HtmlArticleSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F: Fetch> ArticleSource for HtmlArticleSource<F> {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_and_parse(&self, url: &str) -> Result<ArticleRecord, ExtractError> {
        let body = self.fetcher.fetch(url).await?;
        let html = String::from_utf8_lossy(&body);
        parse_article(&html, url)
    }
}

/// Fetch and parse one article, retrying any failure under `policy`.
///
/// Returns `None` once every attempt has failed. One warning is logged per
/// failed attempt that will be retried and one error on exhaustion.
#[instrument(level = "info", skip(source, policy))]
pub async fn extract_with_retry<S: ArticleSource>(
    source: &S,
    url: &str,
    policy: RetryPolicy,
) -> Option<ArticleRecord> {
    let t0 = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match source.fetch_and_parse(url).await {
            Ok(record) => {
                debug!(attempt, title = %record.title, "Extracted article");
                return Some(record);
            }
            Err(e) if attempt >= policy.max_attempts => {
                error!(
                    attempt,
                    max = policy.max_attempts,
                    elapsed_ms_total = t0.elapsed().as_millis(),
                    %url,
                    error = %e,
                    "Failed to download article after all attempts"
                );
                return None;
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(attempt, max = policy.max_attempts, ?delay, %url, error = %e, "Article attempt failed; retrying");
                sleep(delay).await;
            }
        }
    }
}

/// Parse an article page. `page_url` resolves relative image links.
pub fn parse_article(html: &str, page_url: &str) -> Result<ArticleRecord, ExtractError> {
    let document = Html::parse_document(html);

    let title = extract_title(&document).ok_or(ExtractError::MissingTitle)?;
    let publish_date = extract_publish_date(&document).ok_or(ExtractError::MissingPublishDate)?;
    let lead_image_url = extract_lead_image(&document, page_url);

    let content_root = CONTENT_ROOTS
        .iter()
        .find_map(|sel| document.select(sel).next());
    let body_html = content_root.map(|root| root.inner_html());
    let body_text = extract_text(&document, content_root);

    info!(%title, %publish_date, has_html = body_html.is_some(), has_image = lead_image_url.is_some(), "Parsed article page");
    Ok(ArticleRecord {
        title,
        body_html,
        body_text,
        publish_date,
        lead_image_url,
    })
}

fn clean(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn element_text(el: ElementRef<'_>) -> String {
    clean(&el.text().collect::<String>())
}

fn meta_content<'a>(document: &'a Html, selector: &Selector) -> impl Iterator<Item = &'a str> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn extract_title(document: &Html) -> Option<String> {
    meta_content(document, &META_TITLE)
        .map(clean)
        .next()
        .or_else(|| document.select(&H1).map(element_text).find(|t| !t.is_empty()))
        .or_else(|| document.select(&TITLE).map(element_text).find(|t| !t.is_empty()))
}

fn extract_publish_date(document: &Html) -> Option<NaiveDate> {
    if let Some(date) = meta_content(document, &META_DATE).find_map(parse_date) {
        return Some(date);
    }
    let itemprop = document.select(&ITEMPROP_DATE).find_map(|el| {
        el.value()
            .attr("datetime")
            .or_else(|| el.value().attr("content"))
            .and_then(parse_date)
    });
    if itemprop.is_some() {
        return itemprop;
    }
    if let Some(date) = document
        .select(&JSON_LD)
        .find_map(|el| json_ld_date(&el.text().collect::<String>()))
    {
        return Some(date);
    }
    document
        .select(&TIME)
        .filter_map(|el| el.value().attr("datetime"))
        .find_map(parse_date)
}

/// Find a `datePublished` anywhere in a JSON-LD block (objects, arrays, `@graph`).
fn json_ld_date(raw: &str) -> Option<NaiveDate> {
    fn walk(value: &JsonValue) -> Option<NaiveDate> {
        match value {
            JsonValue::Object(map) => map
                .get("datePublished")
                .and_then(JsonValue::as_str)
                .and_then(parse_date)
                .or_else(|| map.values().find_map(walk)),
            JsonValue::Array(items) => items.iter().find_map(walk),
            _ => None,
        }
    }
    let value: JsonValue = serde_json::from_str(raw.trim()).ok()?;
    walk(&value)
}

/// Parse a publication timestamp and keep the calendar date in its own offset.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_date("2025-05-06T23:30:00-05:00"), NaiveDate::from_ymd_opt(2025, 5, 6));
/// ```
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn extract_lead_image(document: &Html, page_url: &str) -> Option<String> {
    let raw = meta_content(document, &META_IMAGE).next()?;
    match Url::parse(page_url).and_then(|base| base.join(raw)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Url::parse(raw).ok().map(|u| u.to_string()),
    }
}

fn extract_text(document: &Html, content_root: Option<ElementRef<'_>>) -> String {
    let paragraphs: Vec<String> = match content_root {
        Some(root) => root.select(&PARAGRAPH).map(element_text).collect(),
        None => document.select(&PARAGRAPH).map(element_text).collect(),
    };
    let paragraphs: Vec<String> = paragraphs.into_iter().filter(|p| !p.is_empty()).collect();
    if !paragraphs.is_empty() {
        return paragraphs.join("\n\n");
    }
    document
        .select(&BODY)
        .next()
        .map(|body| body.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HttpFetch;
    use std::cell::Cell;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <title>Fallback title | El País</title>
  <meta property="og:title" content="  Cumbre   en Bruselas ">
  <meta property="og:image" content="/img/lead.jpg">
  <meta property="article:published_time" content="2025-05-06T08:15:00+02:00">
</head>
<body>
  <nav><p>Menu</p></nav>
  <article>
    <h1>Cumbre en Bruselas</h1>
    <p>Primer párrafo.</p>
    <p>Segundo <b>párrafo</b>.</p>
  </article>
</body>
</html>"#;

    #[test]
    fn test_parse_article_fields() {
        let record = parse_article(PAGE, "https://elpais.com/internacional/a.html").unwrap();
        assert_eq!(record.title, "Cumbre en Bruselas");
        assert_eq!(record.publish_date, NaiveDate::from_ymd_opt(2025, 5, 6).unwrap());
        assert_eq!(
            record.lead_image_url.as_deref(),
            Some("https://elpais.com/img/lead.jpg")
        );
        let html = record.body_html.unwrap();
        assert!(html.contains("<p>Primer párrafo.</p>"));
        assert!(!html.contains("Menu"));
        assert_eq!(record.body_text, "Primer párrafo.\n\nSegundo párrafo.");
    }

    #[test]
    fn test_parse_article_without_content_root() {
        let page = r#"<html><head><title>Solo texto</title>
            <script type="application/ld+json">{"@graph":[{"@type":"NewsArticle","datePublished":"2025-01-02T10:00:00Z"}]}</script>
            </head><body><div><p>Uno.</p><p>  </p><p>Dos.</p></div></body></html>"#;
        let record = parse_article(page, "https://example.com/x").unwrap();
        assert_eq!(record.title, "Solo texto");
        assert_eq!(record.publish_date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert!(record.body_html.is_none());
        assert!(record.lead_image_url.is_none());
        assert_eq!(record.body_text, "Uno.\n\nDos.");
    }

    #[test]
    fn test_parse_article_time_element_date() {
        let page = r#"<html><body><h1>T</h1><time datetime="2024-12-31">ayer</time><p>x</p></body></html>"#;
        let record = parse_article(page, "https://example.com/x").unwrap();
        assert_eq!(record.publish_date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_article_missing_date() {
        let page = "<html><body><h1>T</h1><p>x</p></body></html>";
        let err = parse_article(page, "https://example.com/x").unwrap_err();
        assert!(matches!(err, ExtractError::MissingPublishDate));
    }

    #[test]
    fn test_parse_date_keeps_publisher_offset() {
        assert_eq!(
            parse_date("2025-05-06T23:30:00-05:00"),
            NaiveDate::from_ymd_opt(2025, 5, 6)
        );
        assert_eq!(
            parse_date("Tue, 06 May 2025 01:00:00 +0200"),
            NaiveDate::from_ymd_opt(2025, 5, 6)
        );
        assert_eq!(parse_date("2025-05-06 12:00"), NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(parse_date("yesterday"), None);
    }

    struct Flaky {
        failures: u32,
        calls: Cell<u32>,
    }

    impl ArticleSource for Flaky {
        async fn fetch_and_parse(&self, _url: &str) -> Result<ArticleRecord, ExtractError> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n <= self.failures {
                return Err(ExtractError::Fetch(FetchError::HttpStatus(503)));
            }
            parse_article(PAGE, "https://example.com/a")
        }
    }

    #[tokio::test]
    async fn test_extract_with_retry_recovers() {
        let source = Flaky { failures: 2, calls: Cell::new(0) };
        let record =
            extract_with_retry(&source, "https://example.com/a", RetryPolicy::ARTICLE.without_delay()).await;
        assert!(record.is_some());
        assert_eq!(source.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_extract_with_retry_gives_up_after_three_attempts() {
        let source = Flaky { failures: 10, calls: Cell::new(0) };
        let record =
            extract_with_retry(&source, "https://example.com/a", RetryPolicy::ARTICLE.without_delay()).await;
        assert!(record.is_none());
        assert_eq!(source.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_html_source_retries_parse_failures() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>no title</body></html>"))
            .expect(3)
            .mount(&server)
            .await;

        let source = HtmlArticleSource::new(HttpFetch::new(reqwest::Client::new()));
        let record = extract_with_retry(
            &source,
            &format!("{}/a.html", server.uri()),
            RetryPolicy::ARTICLE.without_delay(),
        )
        .await;
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_html_source_fetches_page() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let source = HtmlArticleSource::new(HttpFetch::new(reqwest::Client::new()));
        let url = format!("{}/internacional/a.html", server.uri());
        let record = source.fetch_and_parse(&url).await.unwrap();
        assert_eq!(record.title, "Cumbre en Bruselas");
        assert_eq!(
            record.lead_image_url.unwrap(),
            format!("{}/img/lead.jpg", server.uri())
        );
    }
}
