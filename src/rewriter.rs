//! Content document rewriting
//!
//! Replaces the footnote marker images of a content document with numbered
//! back-link anchors and appends a reference list to the end of the body.
//!
//! For a document `ch1.xhtml` whose body contains
//! `<img class="qqreader-footnote" alt="Smith, 2020"/>`, the image becomes
//!
//! ```html
//! <a class="footnote-ref" id="ref-1-back-ch1" href="#ref-1">[1]</a>
//! ```
//!
//! and the body ends with
//!
//! ```html
//! <div class="references-section">
//!   <hr/>
//!   <div class="reference-item" id="ref-1">
//!     <a class="reference-number" href="#ref-1-back-ch1" title="Back to text">[1]</a>
//!     <span class="reference-content">Smith, 2020</span>
//!   </div>
//! </div>
//! ```
//!
//! Numbers start at 1 in every document and follow source order. The
//! back-link identifiers carry the document base name, so documents of the
//! same book never produce colliding identifiers.

use std::{fs, path::Path};

use log::{debug, info, warn};

use crate::{
    error::ConvertError,
    markup::{Document, Node, XmlElement},
    types::{Config, ConversionWarning, DocumentReport, MissingAltPolicy, ReferenceEntry},
    utils::{
        DecodeBytes, MARKER_CLASS, STYLESHEET_HREF, TextEncoding, archive_relative,
        file_base_name, relative_path,
    },
};

/// Per-document settings of a rewrite
#[derive(Debug, Clone)]
pub struct RewriteContext<'a> {
    /// File name of the document without extension
    pub document_base: String,

    /// Link from the document to the shared stylesheet
    pub stylesheet_href: String,

    pub missing_alt: MissingAltPolicy,

    pub back_link_title: &'a str,
}

/// What a rewrite did to one document
#[derive(Debug, Clone, Default)]
pub struct RewriteOutcome {
    pub markers_found: usize,
    pub references: Vec<ReferenceEntry>,
    pub stylesheet_linked: bool,
    pub reference_list_appended: bool,
    pub warnings: Vec<String>,
}

/// Rewrites a parsed content document in place
///
/// 1. Links the shared stylesheet unless the document already does.
/// 2. Replaces every footnote marker carrying alt-text with a back-link anchor.
/// 3. Appends the reference list to `body` when at least one marker was replaced.
///
/// Markers are collected before the tree is touched, so replacements cannot
/// disturb the traversal. A marker without alt-text does not get a number and is
/// handled according to [RewriteContext::missing_alt].
pub fn rewrite_document(document: &mut Document, context: &RewriteContext) -> RewriteOutcome {
    let mut outcome = RewriteOutcome {
        stylesheet_linked: ensure_stylesheet_link(document, &context.stylesheet_href),
        ..Default::default()
    };

    let markers = document.find_paths(|element| element.is("img") && element.has_class(MARKER_CLASS));
    outcome.markers_found = markers.len();

    let mut removals = Vec::new();
    for (position, path) in markers.iter().enumerate() {
        let alt_text = document
            .node(path)
            .and_then(Node::as_element)
            .and_then(|img| img.get_attr("alt"))
            .unwrap_or_default();

        if alt_text.is_empty() {
            outcome
                .warnings
                .push(format!("Footnote marker #{} has no alt-text", position + 1));

            if context.missing_alt == MissingAltPolicy::Remove {
                removals.push(path.clone());
            }
            continue;
        }

        let entry = ReferenceEntry::new(outcome.references.len() + 1, &alt_text);
        let anchor = back_link_anchor(&entry, &context.document_base);
        document.replace(path, Node::Element(anchor));

        debug!(
            "  + Replaced {} {}",
            entry.label(),
            entry.text.chars().take(30).collect::<String>()
        );
        outcome.references.push(entry);
    }

    // Replacements keep every index in place; removals shift later siblings,
    // so they run back to front.
    for path in removals.iter().rev() {
        document.remove(path);
    }

    if !outcome.references.is_empty() {
        let list = reference_list(
            &outcome.references,
            &context.document_base,
            context.back_link_title,
        );

        match document.find_element_mut("body") {
            Some(body) => {
                body.append(list);
                outcome.reference_list_appended = true;
            }
            None => debug!("  No <body> element, reference list skipped"),
        }
    }

    outcome
}

/// Adds `<link rel="stylesheet">` to the document head
///
/// Nothing happens when a `link` already points at the shared stylesheet,
/// either through the usual `../Styles/stylesheets.css` or through `href`.
/// A document without `head` gets one as the first child of its root `html`
/// element, or in front of the first top-level element when the root is not `html`.
///
/// ## Return
/// - `true`: A link was inserted
/// - `false`: The document already linked the stylesheet
pub fn ensure_stylesheet_link(document: &mut Document, href: &str) -> bool {
    let linked = document.root_element().is_some_and(|root| {
        root.find_elements_by_name("link").any(|link| {
            link.get_attr("href")
                .is_some_and(|value| value == STYLESHEET_HREF || value == href)
        })
    });
    if linked {
        return false;
    }

    let mut link = XmlElement::new("link")
        .with_attr("rel", "stylesheet")
        .with_attr("type", "text/css")
        .with_attr("href", href);
    link.self_closing = true;

    if let Some(head) = document.find_element_mut("head") {
        head.append(link);
        return true;
    }

    let head = Node::Element(XmlElement::new("head").with_child(link));
    let html_root = document.root_element().is_some_and(|root| root.is("html"));

    if html_root {
        if let Some(root) = document.root_element_mut() {
            root.children.insert(0, head);
        }
    } else {
        // after the declaration and doctype, right before the first element
        let index = document
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(_)))
            .unwrap_or(document.children.len());
        document.children.insert(index, head);
    }

    true
}

/// Builds the anchor that takes the place of a marker image
pub fn back_link_anchor(entry: &ReferenceEntry, document_base: &str) -> XmlElement {
    XmlElement::new("a")
        .with_attr("class", "footnote-ref")
        .with_attr("id", &entry.back_link_id(document_base))
        .with_attr("href", &format!("#{}", entry.item_id()))
        .with_text(&entry.label())
}

/// Builds the reference list appended to the document body
pub fn reference_list(entries: &[ReferenceEntry], document_base: &str, title: &str) -> XmlElement {
    let mut section = XmlElement::new("div")
        .with_attr("class", "references-section")
        .with_child(XmlElement::new("hr"));

    for entry in entries {
        let number = XmlElement::new("a")
            .with_attr("class", "reference-number")
            .with_attr("href", &format!("#{}", entry.back_link_id(document_base)))
            .with_attr("title", title)
            .with_text(&entry.label());

        let content = XmlElement::new("span")
            .with_attr("class", "reference-content")
            .with_text(&entry.text);

        section.append(
            XmlElement::new("div")
                .with_attr("class", "reference-item")
                .with_attr("id", &entry.item_id())
                .with_child(number)
                .with_child(content),
        );
    }

    section
}

/// Rewrites the content document at `path` in place
///
/// ## Parameters
/// - `path`: The content document
/// - `root`: Root of the extracted archive, used for reporting
/// - `stylesheet`: Location of the shared stylesheet
/// - `config`: Conversion settings
///
/// ## Return
/// - `Ok((DocumentReport, Vec<ConversionWarning>))`: The document was rewritten
/// - `Err(ConvertError)`: The document could not be read, decoded, parsed or
///   written; a file that failed before writing is left untouched
pub fn rewrite_file(
    path: &Path,
    root: &Path,
    stylesheet: &Path,
    config: &Config,
) -> Result<(DocumentReport, Vec<ConversionWarning>), ConvertError> {
    let relative = archive_relative(path, root);

    let bytes = fs::read(path)?;
    let (content, encoding) = bytes.decode().map_err(|_| ConvertError::DecodeError {
        path: relative.to_string_lossy().to_string(),
    })?;
    if encoding == TextEncoding::Latin1 {
        info!("  Not valid UTF-8, decoded as Latin-1");
    }

    let mut document = Document::parse(&content)?;

    let document_dir = path.parent().unwrap_or(root);
    let context = RewriteContext {
        document_base: file_base_name(path),
        stylesheet_href: relative_path(document_dir, stylesheet),
        missing_alt: config.missing_alt,
        back_link_title: &config.back_link_title,
    };

    let outcome = rewrite_document(&mut document, &context);

    if outcome.stylesheet_linked {
        info!("  Linked stylesheet {}", context.stylesheet_href);
    }
    if outcome.markers_found > 0 {
        info!("  Found {} footnote marker(s)", outcome.markers_found);
    }
    if outcome.reference_list_appended {
        info!(
            "  Appended reference list with {} entr{}",
            outcome.references.len(),
            if outcome.references.len() == 1 { "y" } else { "ies" }
        );
    }

    // The document is written back as UTF-8 whatever it was read as
    if let Some(declaration) = document.declaration_mut() {
        if declaration
            .encoding
            .as_ref()
            .is_some_and(|name| !name.eq_ignore_ascii_case("utf-8"))
        {
            declaration.encoding = Some("UTF-8".to_string());
        }
    }

    fs::write(path, document.to_bytes()?)?;

    let warnings = outcome
        .warnings
        .iter()
        .map(|message| {
            warn!("  ! {}", message);
            ConversionWarning::new(Some(&relative), message.as_str())
        })
        .collect();

    let report = DocumentReport {
        path: relative,
        markers_found: outcome.markers_found,
        references: outcome.references,
        stylesheet_linked: outcome.stylesheet_linked,
        reference_list_appended: outcome.reference_list_appended,
    };

    Ok((report, warnings))
}
