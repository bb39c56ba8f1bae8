//! EPUB container writing.
//!
//! Produces an EPUB 3 package (with an EPUB 2 NCX for older readers) from a
//! list of manifest items, a spine and a single-section table of contents.
//!
//! # Container Layout
//!
//! ```text
//! mimetype                 (stored, first entry)
//! META-INF/container.xml
//! EPUB/content.opf
//! EPUB/toc.ncx
//! EPUB/nav.xhtml
//! EPUB/<items...>          (chapters, images, style/nav.css)
//! ```

use crate::models::{BookMetadata, Chapter};
use chrono::Utc;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::{self, Cursor, Seek, Write};
use thiserror::Error;
use tracing::{debug, info, instrument};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Directory holding the package document and every content file.
pub const CONTENT_DIR: &str = "EPUB";
pub const NAV_ID: &str = "nav";
pub const NAV_HREF: &str = "nav.xhtml";
pub const STYLE_HREF: &str = "style/nav.css";

/// Stylesheet shipped with every book.
pub const STYLESHEET: &str = r#"@namespace epub "http://www.idpf.org/2007/ops";
body {
    font-family: Arial, sans-serif;
    line-height: 1.6;
    margin: 2em;
}
h1 {
    text-align: center;
    padding: 20px;
    margin-bottom: 1.5em;
}
p {
    margin-bottom: 1em;
    text-align: justify;
}
"#;

#[derive(Debug, Error)]
pub enum EpubError {
    #[error("xml write failed: {0}")]
    Io(#[from] io::Error),
    #[error("zip write failed: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// A file listed in the package manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct EpubItem {
    /// Manifest id, referenced from the spine.
    pub id: String,
    /// Path relative to [`CONTENT_DIR`].
    pub href: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

/// One table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub title: String,
    pub href: String,
}

/// The table of contents: one named section holding every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocSection {
    pub title: String,
    pub entries: Vec<NavPoint>,
}

/// Serialize a complete EPUB into `out`.
///
/// `spine` lists manifest ids in reading order; [`NAV_ID`] refers to the
/// generated navigation document.
#[instrument(level = "info", skip_all, fields(items = items.len(), spine = spine.len()))]
pub fn write_epub<W: Write + Seek>(
    out: W,
    metadata: &BookMetadata,
    items: &[EpubItem],
    spine: &[String],
    toc: &TocSection,
) -> Result<W, EpubError> {
    let mut zip = zip::ZipWriter::new(out);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(&container_xml()?)?;

    zip.start_file(format!("{CONTENT_DIR}/content.opf"), deflated)?;
    zip.write_all(&package_opf(metadata, items, spine)?)?;

    zip.start_file(format!("{CONTENT_DIR}/toc.ncx"), deflated)?;
    zip.write_all(&toc_ncx(metadata, toc)?)?;

    zip.start_file(format!("{CONTENT_DIR}/{NAV_HREF}"), deflated)?;
    zip.write_all(&nav_xhtml(metadata, toc)?)?;

    for item in items {
        let options = if item.media_type.starts_with("image/") { stored } else { deflated };
        zip.start_file(format!("{CONTENT_DIR}/{}", item.href), options)?;
        zip.write_all(&item.content)?;
        debug!(href = %item.href, bytes = item.content.len(), "Wrote package item");
    }

    let out = zip.finish()?;
    info!(entries = items.len() + 5, "EPUB container written");
    Ok(out)
}

/// Serialize a complete EPUB into memory.
pub fn write_epub_to_vec(
    metadata: &BookMetadata,
    items: &[EpubItem],
    spine: &[String],
    toc: &TocSection,
) -> Result<Vec<u8>, EpubError> {
    Ok(write_epub(Cursor::new(Vec::new()), metadata, items, spine, toc)?.into_inner())
}

/// Render a chapter as an XHTML content document.
///
/// The image tag is emitted only when the chapter carries an image.
pub fn render_chapter(chapter: &Chapter, language: &str) -> Result<Vec<u8>, EpubError> {
    let mut w = xml_writer(true)?;
    xhtml_open(&mut w, &chapter.title, language)?;
    w.write_event(Event::Start(BytesStart::new("body")))?;
    text_element(&mut w, "h1", &[], &chapter.title)?;
    text_element(&mut w, "h3", &[], &chapter.category)?;
    if let Some(image) = &chapter.embedded_image {
        empty_element(
            &mut w,
            "img",
            &[("src", image.file_name.as_str()), ("alt", chapter.title.as_str())],
        )?;
    }
    if !chapter.html_content.is_empty() {
        // Already-escaped paragraph markup.
        w.write_event(Event::Text(BytesText::from_escaped(chapter.html_content.as_str())))?;
    }
    w.write_event(Event::End(BytesEnd::new("body")))?;
    w.write_event(Event::End(BytesEnd::new("html")))?;
    Ok(w.into_inner())
}

fn xml_writer(doctype: bool) -> io::Result<Writer<Vec<u8>>> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    if doctype {
        w.write_event(Event::DocType(BytesText::from_escaped("html")))?;
    }
    Ok(w)
}

fn start_element(w: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
    let mut start = BytesStart::new(name);
    for &attr in attrs {
        start.push_attribute(attr);
    }
    w.write_event(Event::Start(start))
}

fn end_element(w: &mut Writer<Vec<u8>>, name: &str) -> io::Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))
}

fn text_element(w: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, &str)], text: &str) -> io::Result<()> {
    start_element(w, name, attrs)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end_element(w, name)
}

fn empty_element(w: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
    let mut el = BytesStart::new(name);
    for &attr in attrs {
        el.push_attribute(attr);
    }
    w.write_event(Event::Empty(el))
}

fn xhtml_open(w: &mut Writer<Vec<u8>>, title: &str, language: &str) -> io::Result<()> {
    start_element(
        w,
        "html",
        &[
            ("xmlns", "http://www.w3.org/1999/xhtml"),
            ("xmlns:epub", "http://www.idpf.org/2007/ops"),
            ("lang", language),
            ("xml:lang", language),
        ],
    )?;
    start_element(w, "head", &[])?;
    text_element(w, "title", &[], title)?;
    empty_element(
        w,
        "link",
        &[("rel", "stylesheet"), ("type", "text/css"), ("href", STYLE_HREF)],
    )?;
    end_element(w, "head")
}

fn container_xml() -> io::Result<Vec<u8>> {
    let mut w = xml_writer(false)?;
    start_element(
        &mut w,
        "container",
        &[("version", "1.0"), ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container")],
    )?;
    start_element(&mut w, "rootfiles", &[])?;
    let full_path = format!("{CONTENT_DIR}/content.opf");
    empty_element(
        &mut w,
        "rootfile",
        &[("full-path", full_path.as_str()), ("media-type", "application/oebps-package+xml")],
    )?;
    end_element(&mut w, "rootfiles")?;
    end_element(&mut w, "container")?;
    Ok(w.into_inner())
}

fn package_opf(metadata: &BookMetadata, items: &[EpubItem], spine: &[String]) -> io::Result<Vec<u8>> {
    let mut w = xml_writer(false)?;
    start_element(
        &mut w,
        "package",
        &[
            ("xmlns", "http://www.idpf.org/2007/opf"),
            ("version", "3.0"),
            ("unique-identifier", "id"),
            ("xml:lang", metadata.language.as_str()),
        ],
    )?;

    start_element(
        &mut w,
        "metadata",
        &[
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:opf", "http://www.idpf.org/2007/opf"),
        ],
    )?;
    text_element(&mut w, "dc:identifier", &[("id", "id")], &metadata.identifier)?;
    text_element(&mut w, "dc:title", &[], &metadata.title)?;
    text_element(&mut w, "dc:language", &[], &metadata.language)?;
    text_element(&mut w, "dc:creator", &[("id", "creator")], &metadata.author)?;
    let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    text_element(&mut w, "meta", &[("property", "dcterms:modified")], &modified)?;
    end_element(&mut w, "metadata")?;

    start_element(&mut w, "manifest", &[])?;
    empty_element(
        &mut w,
        "item",
        &[("id", "ncx"), ("href", "toc.ncx"), ("media-type", "application/x-dtbncx+xml")],
    )?;
    empty_element(
        &mut w,
        "item",
        &[
            ("id", NAV_ID),
            ("href", NAV_HREF),
            ("media-type", "application/xhtml+xml"),
            ("properties", "nav"),
        ],
    )?;
    for item in items {
        empty_element(
            &mut w,
            "item",
            &[
                ("id", item.id.as_str()),
                ("href", item.href.as_str()),
                ("media-type", item.media_type.as_str()),
            ],
        )?;
    }
    end_element(&mut w, "manifest")?;

    start_element(&mut w, "spine", &[("toc", "ncx")])?;
    for idref in spine {
        empty_element(&mut w, "itemref", &[("idref", idref.as_str())])?;
    }
    end_element(&mut w, "spine")?;

    end_element(&mut w, "package")?;
    Ok(w.into_inner())
}

fn toc_ncx(metadata: &BookMetadata, toc: &TocSection) -> io::Result<Vec<u8>> {
    let mut w = xml_writer(false)?;
    start_element(
        &mut w,
        "ncx",
        &[("xmlns", "http://www.daisy.org/z3986/2005/ncx/"), ("version", "2005-1")],
    )?;
    start_element(&mut w, "head", &[])?;
    empty_element(&mut w, "meta", &[("name", "dtb:uid"), ("content", metadata.identifier.as_str())])?;
    empty_element(&mut w, "meta", &[("name", "dtb:depth"), ("content", "2")])?;
    end_element(&mut w, "head")?;

    start_element(&mut w, "docTitle", &[])?;
    text_element(&mut w, "text", &[], &metadata.title)?;
    end_element(&mut w, "docTitle")?;

    start_element(&mut w, "navMap", &[])?;
    start_element(&mut w, "navPoint", &[("id", "section_0")])?;
    start_element(&mut w, "navLabel", &[])?;
    text_element(&mut w, "text", &[], &toc.title)?;
    end_element(&mut w, "navLabel")?;
    let first_href = toc.entries.first().map(|e| e.href.as_str()).unwrap_or(NAV_HREF);
    empty_element(&mut w, "content", &[("src", first_href)])?;
    for (i, entry) in toc.entries.iter().enumerate() {
        let id = format!("navpoint_{}", i + 1);
        start_element(&mut w, "navPoint", &[("id", id.as_str())])?;
        start_element(&mut w, "navLabel", &[])?;
        text_element(&mut w, "text", &[], &entry.title)?;
        end_element(&mut w, "navLabel")?;
        empty_element(&mut w, "content", &[("src", entry.href.as_str())])?;
        end_element(&mut w, "navPoint")?;
    }
    end_element(&mut w, "navPoint")?;
    end_element(&mut w, "navMap")?;
    end_element(&mut w, "ncx")?;
    Ok(w.into_inner())
}

fn nav_xhtml(metadata: &BookMetadata, toc: &TocSection) -> io::Result<Vec<u8>> {
    let mut w = xml_writer(true)?;
    xhtml_open(&mut w, &metadata.title, &metadata.language)?;
    start_element(&mut w, "body", &[])?;
    start_element(&mut w, "nav", &[("epub:type", "toc"), ("id", "id")])?;
    text_element(&mut w, "h2", &[], &metadata.title)?;
    start_element(&mut w, "ol", &[])?;
    start_element(&mut w, "li", &[])?;
    text_element(&mut w, "span", &[], &toc.title)?;
    start_element(&mut w, "ol", &[])?;
    for entry in &toc.entries {
        start_element(&mut w, "li", &[])?;
        text_element(&mut w, "a", &[("href", entry.href.as_str())], &entry.title)?;
        end_element(&mut w, "li")?;
    }
    end_element(&mut w, "ol")?;
    end_element(&mut w, "li")?;
    end_element(&mut w, "ol")?;
    end_element(&mut w, "nav")?;
    end_element(&mut w, "body")?;
    end_element(&mut w, "html")?;
    Ok(w.into_inner())
}
