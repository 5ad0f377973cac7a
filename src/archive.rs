//! Archive handling
//!
//! Extraction of the source EPUB into a working directory, and repacking of a
//! working directory into a new EPUB container.
//!
//! ## Notes
//! - The working directory is removed when its [WorkDir] guard is dropped,
//!   whether the conversion succeeded or not.
//! - Repacking writes `mimetype` first and uncompressed, as the OCF container
//!   format requires; every other entry is deflated.

use std::{
    env,
    fs::{self, File},
    io::{self, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

use crate::{
    error::ConvertError,
    utils::{file_base_name, local_time},
};

/// An extracted EPUB, deleted again on drop
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Extracts an EPUB file into a fresh working directory
    ///
    /// The directory is created under `root` when given, otherwise under the
    /// system temporary directory. Its name carries a timestamp, so concurrent
    /// conversions never share a directory.
    ///
    /// ## Parameters
    /// - `epub_path`: The EPUB file to extract
    /// - `root`: Optional parent directory for the working directory
    ///
    /// ## Return
    /// - `Ok(WorkDir)`: The extracted working directory
    /// - `Err(ConvertError)`: The file could not be opened or is not a valid ZIP archive
    pub fn extract<P: AsRef<Path>>(epub_path: P, root: Option<&Path>) -> Result<Self, ConvertError> {
        let name = format!("epub-footnote-links-{}", local_time());
        let path = match root {
            Some(root) => root.join(name),
            None => env::temp_dir().join(name),
        };

        fs::create_dir_all(&path)?;

        // From here on the guard cleans up after a failed extraction
        let work_dir = WorkDir { path };

        let file = File::open(epub_path.as_ref())?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        archive.extract(&work_dir.path)?;

        debug!(
            "Extracted {} entries to {}",
            archive.len(),
            work_dir.path.display()
        );

        Ok(work_dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    /// Remove working directory when dropped
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            warn!("{}", err);
        };
    }
}

/// Returns `{dir}/{base}_converted.epub` for an input `{dir}/{base}.epub`
pub fn converted_output_path<P: AsRef<Path>>(input: P) -> PathBuf {
    let base = file_base_name(&input);
    input
        .as_ref()
        .with_file_name(format!("{}_converted.epub", base))
}

/// Packs a working directory into an EPUB file at `output`
///
/// The archive is first written to `{base}_temp.zip` next to the output and
/// then renamed, so a failed run never leaves a truncated `.epub` behind.
///
/// ## Return
/// - `Ok(())`: The EPUB file was written
/// - `Err(ConvertError::PackagingError)`: Creating, writing or renaming the archive failed
pub fn repack<P: AsRef<Path>, Q: AsRef<Path>>(dir: P, output: Q) -> Result<(), ConvertError> {
    let output = output.as_ref();
    let temp_zip = output.with_file_name(format!(
        "{}_temp.zip",
        file_base_name(output).trim_end_matches("_converted")
    ));

    let packaging_error = |reason: String| ConvertError::PackagingError {
        output: output.to_string_lossy().to_string(),
        reason,
    };

    if let Err(err) = pack_directory(dir.as_ref(), &temp_zip) {
        if temp_zip.exists() {
            if let Err(remove_err) = fs::remove_file(&temp_zip) {
                warn!("{}", remove_err);
            }
        }
        return Err(packaging_error(err.to_string()));
    }

    fs::rename(&temp_zip, output).map_err(|err| packaging_error(err.to_string()))
}

/// Writes every file and directory under `dir` into a new ZIP archive
pub fn pack_directory(dir: &Path, output: &Path) -> Result<(), ConvertError> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("\"{}\" is not a directory", dir.display()),
        )
        .into());
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    let mimetype = dir.join("mimetype");
    if mimetype.is_file() {
        zip.start_file("mimetype", stored)?;
        zip.write_all(&fs::read(&mimetype)?)?;
    }

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();

        let relative_path = match path.strip_prefix(dir) {
            Ok(relative_path) => relative_path,
            Err(_) => continue,
        };
        let target_path = relative_path.to_string_lossy().replace("\\", "/");

        if target_path == "mimetype" {
            continue;
        }

        if path.is_file() {
            zip.start_file(target_path, deflated)?;
            let mut buf = Vec::new();
            File::open(path)?.read_to_end(&mut buf)?;
            zip.write_all(&buf)?;
        } else if path.is_dir() {
            zip.add_directory(target_path, stored)?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        io::{Read, Write},
        path::{Path, PathBuf},
    };

    use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

    use crate::archive::{WorkDir, converted_output_path, repack};

    fn write_epub(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(b"<package><metadata/></package>").unwrap();
        zip.start_file("OEBPS/Text/ch1.xhtml", options).unwrap();
        zip.write_all(b"<html><body/></html>").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_converted_output_path() {
        assert_eq!(
            converted_output_path("books/novel.epub"),
            PathBuf::from("books/novel_converted.epub")
        );
        assert_eq!(
            converted_output_path("novel.epub"),
            PathBuf::from("novel_converted.epub")
        );
    }

    #[test]
    fn test_extract_and_cleanup() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("book.epub");
        write_epub(&epub);

        let work_root = temp.path().join("work");
        let work_dir = WorkDir::extract(&epub, Some(work_root.as_path())).unwrap();
        let extracted = work_dir.path().to_path_buf();

        assert!(extracted.starts_with(&work_root));
        assert_eq!(
            fs::read_to_string(extracted.join("OEBPS/Text/ch1.xhtml")).unwrap(),
            "<html><body/></html>"
        );

        drop(work_dir);
        assert!(!extracted.exists());
    }

    #[test]
    fn test_extract_invalid_archive() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("broken.epub");
        fs::write(&epub, b"definitely not a zip file").unwrap();

        let work_root = temp.path().join("work");
        let result = WorkDir::extract(&epub, Some(work_root.as_path()));
        assert!(result.is_err());

        // The half-created working directory is gone again
        assert_eq!(fs::read_dir(&work_root).unwrap().count(), 0);
    }

    #[test]
    fn test_repack_writes_mimetype_first() {
        let temp = tempfile::tempdir().unwrap();
        let epub = temp.path().join("book.epub");
        write_epub(&epub);

        let work_dir = WorkDir::extract(&epub, Some(temp.path())).unwrap();
        let output = converted_output_path(&epub);
        repack(work_dir.path(), &output).unwrap();

        assert!(output.exists());
        assert!(!temp.path().join("book_temp.zip").exists());

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        {
            let mut first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);

            let mut content = String::new();
            first.read_to_string(&mut content).unwrap();
            assert_eq!(content, "application/epub+zip");
        }

        let mut chapter = archive.by_name("OEBPS/Text/ch1.xhtml").unwrap();
        let mut content = String::new();
        chapter.read_to_string(&mut content).unwrap();
        assert_eq!(content, "<html><body/></html>");
    }

    #[test]
    fn test_repack_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out_converted.epub");

        let result = repack(temp.path().join("does-not-exist"), &output);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .starts_with("Packaging error:")
        );
        assert!(!output.exists());
        assert!(!temp.path().join("out_temp.zip").exists());
    }
}
