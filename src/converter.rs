//! Conversion pipeline
//!
//! Runs the steps of one conversion in order: extract the archive, patch the
//! cover declaration, provision the shared stylesheet, rewrite every content
//! document and repack the result next to the input.
//!
//! ## Examples
//!
//! ```rust, no_run
//! # use epub_footnote_links::{converter::convert, types::Config};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = convert("books/novel.epub", &Config::default())?;
//!
//! println!("Written to {}", report.output_path.display());
//! println!("{} back-links created", report.total_references());
//! for warning in &report.warnings {
//!     println!("warning: {}", warning);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes
//! - Problems confined to a single step or document are collected into
//!   [ConversionReport::warnings] and the run continues.
//! - Only a failed extraction or a failed repack makes [convert] return an error.

use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use crate::{
    archive::{WorkDir, converted_output_path, repack},
    error::ConvertError,
    metadata::patch_cover_file,
    rewriter::rewrite_file,
    stylesheet::provision_stylesheet,
    types::{Config, ConversionReport, ConversionWarning},
    utils::{METADATA_PATH, STYLESHEET_PATH, archive_relative, is_content_document},
};

/// Checks the input path of a conversion
///
/// Backslashes are turned into forward slashes before the path is checked.
///
/// ## Return
/// - `Ok(PathBuf)`: The normalized path
/// - `Err(ConvertError::InputNotFound)`: Nothing exists at the path
/// - `Err(ConvertError::NotAnEpub)`: The path does not end in `.epub`, in any letter case
pub fn validate_input<P: AsRef<Path>>(input: P) -> Result<PathBuf, ConvertError> {
    let normalized = input.as_ref().to_string_lossy().replace('\\', "/");
    let path = PathBuf::from(&normalized);

    if !path.exists() {
        return Err(ConvertError::InputNotFound { path: normalized });
    }

    let is_epub = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
    if !is_epub {
        return Err(ConvertError::NotAnEpub { path: normalized });
    }

    Ok(path)
}

/// Converts the footnote markers of an EPUB file into internal links
///
/// The converted book is written to `{base}_converted.epub` beside the input;
/// the input itself is never modified.
///
/// ## Parameters
/// - `input`: Path of the source EPUB file
/// - `config`: Conversion settings
///
/// ## Return
/// - `Ok(ConversionReport)`: The converted file was written
/// - `Err(ConvertError)`: The input is invalid, could not be extracted, or
///   the converted archive could not be created
pub fn convert<P: AsRef<Path>>(input: P, config: &Config) -> Result<ConversionReport, ConvertError> {
    let input = validate_input(input)?;
    let output_path = converted_output_path(&input);

    info!("Converting {}", input.display());

    let work_dir = WorkDir::extract(&input, config.work_dir.as_deref())?;
    let root = work_dir.path();

    let mut warnings = Vec::new();

    let cover = match patch_cover_file(root.join(METADATA_PATH), &config.cover_id) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            warn!("Unable to patch {}: {}", METADATA_PATH, err);
            warnings.push(ConversionWarning::new(
                Some(Path::new(METADATA_PATH)),
                err.to_string(),
            ));
            None
        }
    };

    let stylesheet_path = root.join(STYLESHEET_PATH);
    let stylesheet = match provision_stylesheet(&stylesheet_path, config.skip_existing_rules) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            warn!("Unable to write {}: {}", STYLESHEET_PATH, err);
            warnings.push(ConversionWarning::new(
                Some(Path::new(STYLESHEET_PATH)),
                err.to_string(),
            ));
            None
        }
    };

    let mut documents = Vec::new();
    for path in content_documents(root, &mut warnings) {
        let relative = archive_relative(&path, root);
        info!("Processing {}", relative.display());

        match rewrite_file(&path, root, &stylesheet_path, config) {
            Ok((report, mut document_warnings)) => {
                documents.push(report);
                warnings.append(&mut document_warnings);
            }
            Err(err) => {
                warn!("  ! Skipped {}: {}", relative.display(), err);
                warnings.push(ConversionWarning::new(Some(&relative), err.to_string()));
            }
        }
    }

    info!("Repacking into {}", output_path.display());
    repack(root, &output_path)?;

    let report = ConversionReport {
        output_path,
        cover,
        stylesheet,
        documents,
        warnings,
    };

    info!(
        "Converted {} document(s), {} back-link(s), {} warning(s)",
        report.documents.len(),
        report.total_references(),
        report.warnings.len()
    );

    Ok(report)
}

/// Lists the content documents under `root`, sorted by file name per directory
///
/// Entries that cannot be read are recorded in `warnings` and skipped.
fn content_documents(root: &Path, warnings: &mut Vec<ConversionWarning>) -> Vec<PathBuf> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let relative = err.path().map(|path| archive_relative(path, root));
                warn!("  ! Unable to read directory entry: {}", err);
                warnings.push(ConversionWarning::new(
                    relative.as_deref(),
                    ConvertError::from(err).to_string(),
                ));
                continue;
            }
        };

        if entry.file_type().is_file() && is_content_document(entry.path()) {
            documents.push(entry.into_path());
        }
    }

    documents
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        io::{Read, Write},
        path::Path,
    };

    use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

    use crate::{
        converter::{content_documents, convert, validate_input},
        error::ConvertError,
        types::{Config, CoverPatch, MissingAltPolicy, StylesheetOutcome},
    };

    const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Book</dc:title>
  </metadata>
  <manifest/>
</package>"#;

    const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>One</title></head>
<body>
<p>First claim<img class="qqreader-footnote" src="../Images/note.png" alt="Smith, 2020"/>.</p>
<p>Second claim<img class="qqreader-footnote" src="../Images/note.png" alt="Doe, 1999"/>.</p>
</body>
</html>"#;

    const CHAPTER_TWO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Two</title></head>
<body>
<p>Lonely marker<img class="qqreader-footnote" src="../Images/note.png"/>.</p>
<p>Cited<img class="qqreader-footnote" src="../Images/note.png" alt="Roe, 2001"/>.</p>
</body>
</html>"#;

    fn write_epub(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> String {
        let mut content = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn test_validate_input() {
        let temp = tempfile::tempdir().unwrap();

        let missing = temp.path().join("missing.epub");
        assert_eq!(
            validate_input(&missing).unwrap_err(),
            ConvertError::InputNotFound {
                path: missing.to_string_lossy().to_string()
            }
        );

        let text = temp.path().join("notes.txt");
        fs::write(&text, "").unwrap();
        assert_eq!(
            validate_input(&text).unwrap_err(),
            ConvertError::NotAnEpub {
                path: text.to_string_lossy().to_string()
            }
        );

        let upper = temp.path().join("BOOK.EPUB");
        fs::write(&upper, "").unwrap();
        assert_eq!(validate_input(&upper).unwrap(), upper);
    }

    #[test]
    fn test_validate_input_normalizes_backslashes() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("book.epub");
        fs::write(&epub, "").unwrap();

        let windows_style = epub.to_string_lossy().replace('/', "\\");
        assert_eq!(validate_input(windows_style).unwrap(), epub);
    }

    #[test]
    fn test_convert_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("novel.epub");
        write_epub(
            &epub,
            &[
                ("OEBPS/content.opf", PACKAGE),
                ("OEBPS/Text/ch1.xhtml", CHAPTER_ONE),
                ("OEBPS/Text/ch2.xhtml", CHAPTER_TWO),
                ("OEBPS/Images/readme.txt", "not a content document"),
            ],
        );

        let work_root = temp.path().join("work");
        let config = Config::new().with_work_dir(&work_root).build();
        let report = convert(&epub, &config).unwrap();

        assert_eq!(report.output_path, temp.path().join("novel_converted.epub"));
        assert_eq!(report.cover, Some(CoverPatch::Added));
        assert_eq!(report.stylesheet, Some(StylesheetOutcome::Created));
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.total_references(), 3);

        // the marker without alt-text in ch2 is the only warning
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].file.as_deref(),
            Some(Path::new("OEBPS/Text/ch2.xhtml"))
        );

        let ch2 = &report.documents[1];
        assert_eq!(ch2.markers_found, 2);
        assert_eq!(ch2.references.len(), 1);
        assert_eq!(ch2.references[0].local_id, 1);

        // the working directory is gone, the input is untouched
        assert_eq!(fs::read_dir(&work_root).unwrap().count(), 0);
        assert!(epub.exists());

        let mut archive = ZipArchive::new(File::open(&report.output_path).unwrap()).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");

        let opf = read_entry(&mut archive, "OEBPS/content.opf");
        assert_eq!(opf.matches(r#"<meta name="cover" content="Cover1"/>"#).count(), 1);

        let css = read_entry(&mut archive, "OEBPS/Styles/stylesheets.css");
        assert!(css.contains(".footnote-ref {"));

        let ch1 = read_entry(&mut archive, "OEBPS/Text/ch1.xhtml");
        assert!(ch1.contains(r#"href="../Styles/stylesheets.css""#));
        assert!(ch1.contains(
            r##"<a class="footnote-ref" id="ref-2-back-ch1" href="#ref-2">[2]</a>"##
        ));
        assert!(ch1.contains(r#"<span class="reference-content">Doe, 1999</span>"#));
        assert!(!ch1.contains("qqreader-footnote"));

        let ch2 = read_entry(&mut archive, "OEBPS/Text/ch2.xhtml");
        assert!(ch2.contains(r#"id="ref-1-back-ch2""#));
        assert!(ch2.contains(r#"<img class="qqreader-footnote" src="../Images/note.png"/>"#));

        assert_eq!(
            read_entry(&mut archive, "OEBPS/Images/readme.txt"),
            "not a content document"
        );
    }

    #[test]
    fn test_convert_continues_without_metadata() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("bare.epub");
        write_epub(
            &epub,
            &[
                ("OEBPS/Styles/stylesheets.css", "body { margin: 0; }"),
                ("OEBPS/Text/ch1.html", CHAPTER_ONE),
            ],
        );

        let config = Config::new()
            .with_work_dir(temp.path())
            .with_missing_alt(MissingAltPolicy::Remove)
            .build();
        let report = convert(&epub, &config).unwrap();

        assert_eq!(report.cover, None);
        assert_eq!(report.stylesheet, Some(StylesheetOutcome::Appended));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].file.as_deref(),
            Some(Path::new("OEBPS/content.opf"))
        );
        assert_eq!(report.total_references(), 2);

        let mut archive = ZipArchive::new(File::open(&report.output_path).unwrap()).unwrap();
        let css = read_entry(&mut archive, "OEBPS/Styles/stylesheets.css");
        assert!(css.starts_with("body { margin: 0; }"));
    }

    #[test]
    fn test_convert_skips_broken_document() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("broken.epub");
        write_epub(
            &epub,
            &[
                ("OEBPS/content.opf", PACKAGE),
                ("OEBPS/Text/a_empty.xhtml", ""),
                ("OEBPS/Text/b_chapter.xhtml", CHAPTER_ONE),
            ],
        );

        let config = Config::new().with_work_dir(temp.path()).build();
        let report = convert(&epub, &config).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.total_references(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].file.as_deref(),
            Some(Path::new("OEBPS/Text/a_empty.xhtml"))
        );
    }

    #[test]
    fn test_unreadable_entries_become_warnings() {
        let temp = tempfile::tempdir().unwrap();
        let text_dir = temp.path().join("OEBPS/Text");
        fs::create_dir_all(&text_dir).unwrap();
        fs::write(text_dir.join("ch2.xhtml"), "").unwrap();
        fs::write(text_dir.join("ch1.html"), "").unwrap();
        fs::write(text_dir.join("notes.txt"), "").unwrap();

        let mut warnings = Vec::new();
        let documents = content_documents(temp.path(), &mut warnings);
        assert!(warnings.is_empty());
        assert_eq!(documents, vec![text_dir.join("ch1.html"), text_dir.join("ch2.xhtml")]);

        // a root that cannot be walked is reported, not raised
        let missing = temp.path().join("missing");
        let documents = content_documents(&missing, &mut warnings);
        assert!(documents.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("WalkDir error:"));
    }

    #[test]
    fn test_convert_invalid_archive() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("fake.epub");
        fs::write(&epub, b"not a zip container").unwrap();

        let config = Config::new().with_work_dir(temp.path().join("work")).build();
        let result = convert(&epub, &config);

        assert!(matches!(result, Err(ConvertError::ArchiveError { .. })));
        assert!(!temp.path().join("fake_converted.epub").exists());
    }
}
