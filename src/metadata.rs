//! Cover declaration patching
//!
//! Makes sure the package document declares its cover image through
//! `<meta name="cover" content="..."/>`, which older reading systems rely on.
//! The patch is idempotent: a document that already declares a cover, whatever
//! the declared value, is left untouched.

use std::{fs, path::Path};

use log::info;

use crate::{
    error::ConvertError,
    markup::{Document, XmlElement},
    types::CoverPatch,
    utils::DecodeBytes,
};

/// Checks whether any `meta` element in the document asserts `name="cover"`
pub fn has_cover_declaration(document: &Document) -> bool {
    document
        .root_element()
        .is_some_and(|root| {
            root.find_elements_by_name("meta")
                .any(|meta| meta.get_attr("name").is_some_and(|name| name == "cover"))
        })
}

/// Adds the cover declaration to a parsed package document
///
/// ## Parameters
/// - `document`: The package document
/// - `cover_id`: Value of the `content` attribute of the new declaration
///
/// ## Return
/// - `Ok(CoverPatch::AlreadyPresent)`: A declaration exists, nothing changed
/// - `Ok(CoverPatch::Added)`: The declaration was appended as the last child of `<metadata>`
/// - `Err(ConvertError::StructuralError)`: There is no `<metadata>` element
pub fn patch_cover(document: &mut Document, cover_id: &str) -> Result<CoverPatch, ConvertError> {
    if has_cover_declaration(document) {
        return Ok(CoverPatch::AlreadyPresent);
    }

    let metadata =
        document
            .find_element_mut("metadata")
            .ok_or_else(|| ConvertError::StructuralError {
                tag: "metadata".to_string(),
            })?;

    let mut cover_meta = XmlElement::new("meta")
        .with_attr("name", "cover")
        .with_attr("content", cover_id);

    // `<opf:metadata>` gets an `<opf:meta>`
    cover_meta.prefix = metadata.prefix.clone();
    cover_meta.self_closing = true;

    metadata.append(cover_meta);
    Ok(CoverPatch::Added)
}

/// Text-level variant of [patch_cover]
///
/// Returns the resulting document text together with the outcome. When the
/// declaration is already present the text is returned unchanged.
pub fn patch_cover_text(content: &str, cover_id: &str) -> Result<(String, CoverPatch), ConvertError> {
    let mut document = Document::parse_xml(content)?;

    match patch_cover(&mut document, cover_id)? {
        CoverPatch::AlreadyPresent => Ok((content.to_string(), CoverPatch::AlreadyPresent)),
        CoverPatch::Added => {
            let bytes = document.to_bytes()?;
            Ok((String::from_utf8_lossy(&bytes).to_string(), CoverPatch::Added))
        }
    }
}

/// Patches the package document at `path` in place
///
/// The file is only rewritten when a declaration was added.
pub fn patch_cover_file<P: AsRef<Path>>(path: P, cover_id: &str) -> Result<CoverPatch, ConvertError> {
    let path = path.as_ref();
    let (content, _) = fs::read(path)?.decode()?;

    let (patched, outcome) = patch_cover_text(&content, cover_id)?;
    match outcome {
        CoverPatch::AlreadyPresent => {
            info!("Cover declaration already present in {}", path.display());
        }
        CoverPatch::Added => {
            fs::write(path, patched)?;
            info!(
                "Added cover declaration (content=\"{}\") to {}",
                cover_id,
                path.display()
            );
        }
    }

    Ok(outcome)
}
