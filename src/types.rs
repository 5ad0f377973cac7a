use std::path::{Path, PathBuf};

/// What to do with a footnote marker that carries no alt-text
///
/// A marker without alt-text has nothing to contribute to the reference list,
/// so it never consumes a reference number.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MissingAltPolicy {
    /// Keep the marker image in the document untouched
    #[default]
    Leave,

    /// Drop the marker image from the document
    Remove,
}

/// Conversion settings
///
/// The defaults reproduce the behaviour of a plain conversion; the setters
/// can be chained to adjust individual settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Value of the `content` attribute of the generated `<meta name="cover">`
    pub cover_id: String,

    pub missing_alt: MissingAltPolicy,

    /// Skip the stylesheet append when the rule block is already present
    ///
    /// When `false`, every run appends the rule block to an existing stylesheet again.
    /// Defaults to `true`, so converting a converted book leaves the stylesheet as it is.
    pub skip_existing_rules: bool,

    /// Root directory for extraction, a fresh temporary directory when `None`
    pub work_dir: Option<PathBuf>,

    /// Tooltip of the numbered links in the reference list
    pub back_link_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cover_id: "Cover1".to_string(),
            missing_alt: MissingAltPolicy::Leave,
            skip_existing_rules: true,
            work_dir: None,
            back_link_title: "Back to text".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cover_id(&mut self, cover_id: &str) -> &mut Self {
        self.cover_id = cover_id.to_string();
        self
    }

    pub fn with_missing_alt(&mut self, policy: MissingAltPolicy) -> &mut Self {
        self.missing_alt = policy;
        self
    }

    pub fn with_skip_existing_rules(&mut self, skip: bool) -> &mut Self {
        self.skip_existing_rules = skip;
        self
    }

    pub fn with_work_dir<P: AsRef<Path>>(&mut self, work_dir: P) -> &mut Self {
        self.work_dir = Some(work_dir.as_ref().to_path_buf());
        self
    }

    pub fn with_back_link_title(&mut self, title: &str) -> &mut Self {
        self.back_link_title = title.to_string();
        self
    }

    pub fn build(&self) -> Self {
        self.clone()
    }
}

/// A reference collected from one footnote marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// 1-based number, unique within one content document
    pub local_id: usize,

    /// The alt-text of the marker, verbatim
    pub text: String,
}

impl ReferenceEntry {
    pub fn new(local_id: usize, text: &str) -> Self {
        Self {
            local_id,
            text: text.to_string(),
        }
    }

    /// Identifier of the reference list item
    pub fn item_id(&self) -> String {
        format!("ref-{}", self.local_id)
    }

    /// Identifier of the back-link anchor that replaced the marker
    ///
    /// Qualified with the document base name so that anchors of different
    /// content documents in the same archive never collide.
    pub fn back_link_id(&self, document_base: &str) -> String {
        format!("ref-{}-back-{}", self.local_id, document_base)
    }

    /// Visible label of both links, e.g. `[3]`
    pub fn label(&self) -> String {
        format!("[{}]", self.local_id)
    }
}

/// Outcome of the cover declaration patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverPatch {
    AlreadyPresent,
    Added,
}

/// Outcome of the stylesheet provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylesheetOutcome {
    Created,
    Appended,

    /// Only reported when skipping existing rules is enabled
    AlreadyPresent,
}

/// A non-fatal problem met during a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    /// The file the warning relates to, relative to the archive root when possible
    pub file: Option<PathBuf>,

    pub message: String,
}

impl ConversionWarning {
    pub fn new(file: Option<&Path>, message: impl Into<String>) -> Self {
        Self {
            file: file.map(Path::to_path_buf),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}: {}", file.display(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Result of rewriting a single content document
#[derive(Debug, Clone, Default)]
pub struct DocumentReport {
    pub path: PathBuf,

    /// Number of marker images found, with or without alt-text
    pub markers_found: usize,

    /// Entries in reference list order
    pub references: Vec<ReferenceEntry>,

    /// Whether a stylesheet link had to be inserted
    pub stylesheet_linked: bool,

    pub reference_list_appended: bool,
}

/// Structured result of a whole conversion
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Path of the converted `.epub` file
    pub output_path: PathBuf,

    /// `None` when the metadata document could not be patched
    pub cover: Option<CoverPatch>,

    /// `None` when the stylesheet could not be written
    pub stylesheet: Option<StylesheetOutcome>,

    /// Reports of the documents that were rewritten, in processing order
    pub documents: Vec<DocumentReport>,

    pub warnings: Vec<ConversionWarning>,
}

impl ConversionReport {
    /// Total number of back-links created over all documents
    pub fn total_references(&self) -> usize {
        self.documents.iter().map(|doc| doc.references.len()).sum()
    }
}
