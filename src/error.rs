//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while converting
//! the footnote markers of an EPUB file. All errors are uniformly wrapped in the
//! `ConvertError` enumeration for convenient error handling by the caller.
//!
//! Most of these errors are document-local: the converter records them as
//! warnings and keeps going. Only [ConvertError::PackagingError] and failures
//! while extracting the source archive abort a conversion.

use thiserror::Error;

/// Types of errors that can occur during a conversion
#[derive(Debug, Error)]
pub enum ConvertError {
    /// ZIP archive related errors
    ///
    /// Errors occur when reading the ZIP structure of the source EPUB file,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Content document decoding error
    ///
    /// This error occurs when a content document cannot be decoded
    /// under any of the supported encodings. The document is skipped.
    #[error("Decode error: The file \"{path}\" could not be decoded.")]
    DecodeError { path: String },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// Markup parsing failure error
    ///
    /// Occurs when the markup contains no element at all,
    /// so there is nothing to rewrite.
    #[error("Failed parsing markup: The document does not contain any element.")]
    FailedParsingMarkup,

    /// Input file not found error
    #[error("Input not found: The file \"{path}\" does not exist.")]
    InputNotFound { path: String },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Input file is not an EPUB error
    ///
    /// Triggered when the input path does not carry the `.epub` extension.
    #[error("Not an epub: The file \"{path}\" does not have the \".epub\" extension.")]
    NotAnEpub { path: String },

    /// Repacking error
    ///
    /// This error occurs when the converted archive cannot be written or
    /// moved to its final location. It is fatal to the conversion.
    #[error("Packaging error: Unable to create \"{output}\": {reason}")]
    PackagingError { output: String, reason: String },

    /// QuickXml error
    ///
    /// This error occurs when reading or writing markup with the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },

    /// Missing container element error
    ///
    /// This error is triggered when an element that the conversion needs
    /// to modify, such as `<metadata>`, is missing from the document.
    #[error("Structural error: The \"{tag}\" element was not found.")]
    StructuralError { tag: String },

    /// WalkDir error
    ///
    /// This error occurs when using the WalkDir library to traverse the working directory.
    #[error("WalkDir error: {source}")]
    WalkDirError { source: walkdir::Error },
}

impl From<zip::result::ZipError> for ConvertError {
    fn from(value: zip::result::ZipError) -> Self {
        ConvertError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for ConvertError {
    fn from(value: quick_xml::Error) -> Self {
        ConvertError::QuickXmlError { source: value }
    }
}

impl From<quick_xml::escape::EscapeError> for ConvertError {
    fn from(value: quick_xml::escape::EscapeError) -> Self {
        ConvertError::QuickXmlError {
            source: quick_xml::Error::from(value),
        }
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(value: std::io::Error) -> Self {
        ConvertError::IOError { source: value }
    }
}

impl From<walkdir::Error> for ConvertError {
    fn from(value: walkdir::Error) -> Self {
        ConvertError::WalkDirError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for ConvertError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DecodeError { path: l_path }, Self::DecodeError { path: r_path }) => {
                l_path == r_path
            }
            (Self::InputNotFound { path: l_path }, Self::InputNotFound { path: r_path }) => {
                l_path == r_path
            }
            (Self::NotAnEpub { path: l_path }, Self::NotAnEpub { path: r_path }) => {
                l_path == r_path
            }
            (
                Self::PackagingError {
                    output: l_output,
                    reason: l_reason,
                },
                Self::PackagingError {
                    output: r_output,
                    reason: r_reason,
                },
            ) => l_output == r_output && l_reason == r_reason,
            (Self::StructuralError { tag: l_tag }, Self::StructuralError { tag: r_tag }) => {
                l_tag == r_tag
            }

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
