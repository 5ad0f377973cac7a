//! Epub footnote links
//!
//! A Rust library for turning the image-based footnote markers of an EPUB
//! eBook into navigable internal links.
//!
//! Some publishing pipelines render every citation as a small inline image
//! carrying the class `qqreader-footnote`, with the citation text hidden in the
//! image's `alt` attribute. Most reading systems show such a marker as a bare
//! icon. This library replaces each marker with a numbered link and appends a
//! reference list to the end of the chapter, where every entry links back to
//! its place in the text.
//!
//! ## Features
//!
//! - Rewrites every `html`/`xhtml` content document of the book, numbering
//!   references per document and qualifying link targets with the document name.
//! - Declares the cover image in `OEBPS/content.opf` when the declaration is missing.
//! - Provides the presentation rules in the shared `OEBPS/Styles/stylesheets.css`
//!   and links it from every content document.
//! - Reports per-document results and non-fatal problems in a structured
//!   [ConversionReport](types::ConversionReport).
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # use epub_footnote_links::{converter::convert, types::{Config, MissingAltPolicy}};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new()
//!     .with_missing_alt(MissingAltPolicy::Remove)
//!     .with_back_link_title("Return to text")
//!     .build();
//!
//! // Writes "path/to/book_converted.epub"
//! let report = convert("path/to/book.epub", &config)?;
//! println!("{} references linked", report.total_references());
//!
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `cli`: Enabled by default, builds the `epub-footnote-links` command line
//!   tool. Library users can turn it off with `default-features = false`.

pub(crate) mod utils;

pub mod archive;
pub mod converter;
pub mod error;
pub mod markup;
pub mod metadata;
pub mod rewriter;
pub mod stylesheet;
pub mod types;

pub use utils::{DecodeBytes, TextEncoding};
