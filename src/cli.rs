use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use epub_footnote_links::types::{Config, MissingAltPolicy};

/// Turn the image footnote markers of an EPUB into internal links with a reference list
#[derive(Parser, Debug)]
#[command(name = "epub-footnote-links", version, about)]
pub struct Cli {
    /// Path to the input EPUB file. Prompted for when omitted.
    pub input: Option<PathBuf>,

    /// Value of the `content` attribute of the generated cover declaration
    #[arg(long, default_value = "Cover1")]
    pub cover_id: String,

    /// Directory to extract the book into. Defaults to the system temporary directory.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// What to do with footnote markers that have no alt-text
    #[arg(long, value_enum, default_value_t = MissingAlt::Leave)]
    pub missing_alt: MissingAlt,

    /// Append the footnote styles even when the stylesheet already has them
    #[arg(long, default_value_t = false)]
    pub always_append_rules: bool,

    /// Tooltip of the links leading from the reference list back to the text
    #[arg(long, default_value = "Back to text")]
    pub back_link_title: String,

    /// Log every replaced marker
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingAlt {
    /// Keep the marker image untouched
    Leave,

    /// Drop the marker image
    Remove,
}

impl From<MissingAlt> for MissingAltPolicy {
    fn from(value: MissingAlt) -> Self {
        match value {
            MissingAlt::Leave => MissingAltPolicy::Leave,
            MissingAlt::Remove => MissingAltPolicy::Remove,
        }
    }
}

impl Cli {
    pub fn config(&self) -> Config {
        let mut config = Config::new();
        config
            .with_cover_id(&self.cover_id)
            .with_missing_alt(self.missing_alt.into())
            .with_skip_existing_rules(!self.always_append_rules)
            .with_back_link_title(&self.back_link_title);

        if let Some(work_dir) = &self.work_dir {
            config.with_work_dir(work_dir);
        }

        config
    }
}
