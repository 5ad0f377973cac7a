use std::path::{Component, Path, PathBuf};

use chrono::Local;

use crate::error::ConvertError;

/// Location of the package metadata document inside the archive
pub const METADATA_PATH: &str = "OEBPS/content.opf";

/// Location of the shared stylesheet inside the archive
pub const STYLESHEET_PATH: &str = "OEBPS/Styles/stylesheets.css";

/// The stylesheet link most content documents already carry
pub const STYLESHEET_HREF: &str = "../Styles/stylesheets.css";

/// Class identifying footnote marker images
pub const MARKER_CLASS: &str = "qqreader-footnote";

/// File extensions of content documents, compared case-insensitively
pub const CONTENT_EXTENSIONS: [&str; 2] = ["html", "xhtml"];

/// Returns the current time with custom format
pub fn local_time() -> String {
    Local::now().format("%Y-%m-%dT%H-%M-%S.%fU%z").to_string()
}

/// Checks whether the path names a content document
pub fn is_content_document<P: AsRef<Path>>(path: P) -> bool {
    match path.as_ref().extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            CONTENT_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Returns the file name without its extension
pub fn file_base_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Computes the relative link from a directory to a file
///
/// Both paths must be relative to the same root (or both absolute). The common
/// leading components are dropped, every remaining component of `from_dir`
/// becomes a `..`, and the remainder of `target` is appended. The result always
/// uses forward slashes, as required inside markup.
///
/// ## Parameters
/// - `from_dir`: The directory containing the linking document
/// - `target`: The file being linked to
///
/// ## Return
/// - `String`: The relative link, e.g. `../Styles/stylesheets.css`
pub fn relative_path<P: AsRef<Path>, Q: AsRef<Path>>(from_dir: P, target: Q) -> String {
    let from = normal_components(from_dir.as_ref());
    let to = normal_components(target.as_ref());

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(left, right)| left == right)
        .count();

    let mut parts = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for component in &to[common..] {
        parts.push(component.clone());
    }

    parts.join("/")
}

fn normal_components(path: &Path) -> Vec<String> {
    let mut components: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => components.push(part.to_string_lossy().to_string()),
            Component::ParentDir => {
                components.pop();
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    components
}

/// Strips `root` from `path`, falling back to the full path
pub fn archive_relative<P: AsRef<Path>, R: AsRef<Path>>(path: P, root: R) -> PathBuf {
    match path.as_ref().strip_prefix(root.as_ref()) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path.as_ref().to_path_buf(),
    }
}

/// The text encoding a byte stream was decoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16,
    Latin1,
}

/// Provides functionality to decode byte data into strings
///
/// This trait is used to decode the raw bytes of content documents into a
/// string. UTF-8 (with or without BOM) is tried first, UTF-16 is accepted
/// when a BOM announces it, and everything else is read as Latin-1.
///
/// ## Notes
/// - Latin-1 maps every byte to a character, so the fallback never fails;
///   the only decode error left is empty input.
pub trait DecodeBytes {
    fn decode(&self) -> Result<(String, TextEncoding), ConvertError>;
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<(String, TextEncoding), ConvertError> {
        if self.is_empty() {
            return Err(ConvertError::EmptyDataError);
        }

        match self {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, rest @ ..] => match String::from_utf8(rest.to_vec()) {
                Ok(text) => Ok((text, TextEncoding::Utf8)),
                Err(_) => Ok((latin1(self), TextEncoding::Latin1)),
            },

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, rest @ ..] => {
                let utf16_units: Vec<u16> = rest
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                match String::from_utf16(&utf16_units) {
                    Ok(text) => Ok((text, TextEncoding::Utf16)),
                    Err(_) => Ok((latin1(self), TextEncoding::Latin1)),
                }
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, rest @ ..] => {
                let utf16_units: Vec<u16> = rest
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                match String::from_utf16(&utf16_units) {
                    Ok(text) => Ok((text, TextEncoding::Utf16)),
                    Err(_) => Ok((latin1(self), TextEncoding::Latin1)),
                }
            }

            _ => match std::str::from_utf8(self) {
                Ok(text) => Ok((text.to_string(), TextEncoding::Utf8)),
                Err(_) => Ok((latin1(self), TextEncoding::Latin1)),
            },
        }
    }
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<(String, TextEncoding), ConvertError> {
        self.as_slice().decode()
    }
}

/// Every Latin-1 byte is the Unicode scalar value of the same number
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::{
        error::ConvertError,
        utils::{
            DecodeBytes, TextEncoding, file_base_name, is_content_document, relative_path,
        },
    };

    /// Test with empty data
    #[test]
    fn test_decode_empty_data() {
        let data: Vec<u8> = vec![];
        let result = data.decode();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err(), ConvertError::EmptyDataError);
    }

    /// Testing text decoding with UTF-8 BOM
    #[test]
    fn test_decode_utf8_with_bom() {
        let data: Vec<u8> = vec![0xEF, 0xBB, 0xBF, b'H', b'e', b'l', b'l', b'o'];
        let result = data.decode();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), ("Hello".to_string(), TextEncoding::Utf8));
    }

    /// Test text decoding with UTF-16 BE BOM
    #[test]
    fn test_decode_utf16_be_with_bom() {
        let data = vec![
            0xFE, 0xFF, // BOM
            0x00, b'H', // H
            0x00, b'i', // i
        ];
        let result = data.decode();
        assert_eq!(result.unwrap(), ("Hi".to_string(), TextEncoding::Utf16));
    }

    #[test]
    fn test_decode_plain_utf8() {
        let data = "参考文献 Hello".as_bytes().to_vec();
        let result = data.decode();
        assert_eq!(
            result.unwrap(),
            ("参考文献 Hello".to_string(), TextEncoding::Utf8)
        );
    }

    /// Bytes that are not valid UTF-8 fall back to Latin-1
    #[test]
    fn test_decode_latin1_fallback() {
        // "café" encoded as ISO-8859-1
        let data = vec![b'c', b'a', b'f', 0xE9];
        let result = data.decode();
        assert_eq!(result.unwrap(), ("café".to_string(), TextEncoding::Latin1));
    }

    #[test]
    fn test_relative_path_sibling_directory() {
        let href = relative_path("OEBPS/Text", "OEBPS/Styles/stylesheets.css");
        assert_eq!(href, "../Styles/stylesheets.css");
    }

    #[test]
    fn test_relative_path_same_directory() {
        let href = relative_path("OEBPS", "OEBPS/Styles/stylesheets.css");
        assert_eq!(href, "Styles/stylesheets.css");
    }

    #[test]
    fn test_relative_path_deeper_document() {
        let href = relative_path("OEBPS/Text/part1", "OEBPS/Styles/stylesheets.css");
        assert_eq!(href, "../../Styles/stylesheets.css");

        let href = relative_path("", "OEBPS/Styles/stylesheets.css");
        assert_eq!(href, "OEBPS/Styles/stylesheets.css");
    }

    #[test]
    fn test_content_document_detection() {
        assert!(is_content_document("OEBPS/Text/ch1.xhtml"));
        assert!(is_content_document("OEBPS/Text/CH2.HTML"));
        assert!(!is_content_document("OEBPS/content.opf"));
        assert!(!is_content_document(Path::new("OEBPS/Text/README")));
    }

    #[test]
    fn test_file_base_name() {
        assert_eq!(file_base_name("OEBPS/Text/chapter01.xhtml"), "chapter01");
        assert_eq!(file_base_name("a.b.html"), "a.b");
    }
}
