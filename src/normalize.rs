//! Conversion of extracted article bodies into flat paragraph markup.
//!
//! The output is a newline-joined sequence of `<p>…</p>` elements with
//! escaped text and no other markup, ready to drop into a chapter body.

use crate::models::ArticleRecord;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;
use scraper::{Html, Selector};

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").unwrap());

/// Build the paragraph fragment for an article.
///
/// Structured HTML wins when it yields at least one non-empty paragraph;
/// otherwise the plain text is split on blank lines.
pub fn normalize(record: &ArticleRecord) -> String {
    record
        .body_html
        .as_deref()
        .map(paragraphs_from_html)
        .filter(|paras| !paras.is_empty())
        .unwrap_or_else(|| paragraphs_from_text(&record.body_text))
        .iter()
        .map(|p| format!("<p>{}</p>", escape(p.as_str())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of every `<p>` in the fragment, in document order.
pub fn paragraphs_from_html(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Blank-line-delimited segments of `text`, trimmed, empties dropped.
pub fn paragraphs_from_text(text: &str) -> Vec<String> {
    BLANK_LINE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
