//! Shared stylesheet provisioning
//!
//! Adds the presentation rules for back-link anchors and reference lists to the
//! book's shared stylesheet, creating the stylesheet when the book has none.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use log::info;

use crate::{error::ConvertError, types::StylesheetOutcome};

/// Header of a newly created stylesheet
pub const STYLESHEET_HEADER: &str = "/* EPUB global styles */\n";

/// Comment placed in front of every rule block this crate writes
pub const RULES_MARKER: &str = "/* Footnote reference styles - added by epub-footnote-links */";

/// Rules for `.footnote-ref` anchors and the generated reference list
pub const FOOTNOTE_RULES: &str = r#"
/* footnote markers in the text */
.footnote-ref {
    vertical-align: super;
    font-size: 75%;
    cursor: pointer;
    transition: all 0.3s ease;
}

.footnote-ref:hover {
    background: #e6f0ff;
    transform: scale(1.1);
}

/* reference list */
.references-section {
    margin-top: 40px;
    padding-top: 20px;
    border-top: 1px solid #eee;
}

.reference-item {
    padding: 8px 0;
    margin: 8px 0;
    border-bottom: 1px dashed #e0e0e0;
}

.reference-number {
    color: #3498db;
    margin-right: 8px;
    cursor: pointer;
    transition: all 0.2s ease;
    display: inline-block;
    min-width: 24px;
}

.reference-number:hover {
    color: #e74c3c;
    transform: scale(1.1);
}

.reference-content {
    display: inline;
    font-size: 0.9em;
}
"#;

/// Ensures the stylesheet at `path` carries the footnote rules
///
/// An existing stylesheet gets the rule block appended behind [RULES_MARKER].
/// Unless `skip_existing` is set, this happens on every call, so converting an
/// already converted book repeats the block. With `skip_existing` the marker
/// comment is looked up first and nothing is written when it is found.
///
/// A missing stylesheet is created, together with its directory, holding a
/// header comment, the marker and the rule block.
///
/// ## Parameters
/// - `path`: Location of the stylesheet file
/// - `skip_existing`: Whether to look for an earlier rule block first
pub fn provision_stylesheet<P: AsRef<Path>>(
    path: P,
    skip_existing: bool,
) -> Result<StylesheetOutcome, ConvertError> {
    let path = path.as_ref();

    if path.exists() {
        if skip_existing {
            let existing = fs::read(path)?;
            if String::from_utf8_lossy(&existing).contains(RULES_MARKER) {
                info!("Footnote styles already present in {}", path.display());
                return Ok(StylesheetOutcome::AlreadyPresent);
            }
        }

        let mut file = OpenOptions::new().append(true).open(path)?;
        write!(file, "\n\n{}\n{}", RULES_MARKER, FOOTNOTE_RULES)?;

        info!("Appended footnote styles to {}", path.display());
        return Ok(StylesheetOutcome::Appended);
    }

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    // The marker is written here too, so a later run with `skip_existing` finds it
    fs::write(
        path,
        format!("{}{}\n{}", STYLESHEET_HEADER, RULES_MARKER, FOOTNOTE_RULES),
    )?;

    info!("Created stylesheet {}", path.display());
    Ok(StylesheetOutcome::Created)
}
