//! Output generation.
//!
//! # Submodules
//!
//! - [`epub`]: writes the finished book as an EPUB container
//!
//! # Output Structure
//!
//! ```text
//! el_pais.epub
//! ├── mimetype
//! ├── META-INF/container.xml
//! └── EPUB/
//!     ├── content.opf
//!     ├── toc.ncx
//!     ├── nav.xhtml
//!     ├── style/nav.css
//!     ├── <chapter>.xhtml ...
//!     └── <image>.jpeg ...
//! ```

pub mod epub;
