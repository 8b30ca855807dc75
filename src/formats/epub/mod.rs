//! EPUB to PDF
//!
//! The container is unpacked into memory, its images are extracted into the
//! workspace under their basenames, document references are flattened to
//! match, and the concatenated documents are rendered by an [`HtmlRenderer`].

mod container;
mod engine;
mod renderer;

pub use container::{EpubDocument, EpubItem, ItemKind, DEFAULT_EXTRACTION_LIMIT};
pub use engine::{HtmlRenderer, MupdfRenderer, PageSetup, A4_HEIGHT, A4_WIDTH};
pub use renderer::{prepare_book, EpubRenderer, ExtractedAsset, PreparedBook, COMBINED_DOCUMENT};

use std::path::PathBuf;

use thiserror::Error;

use crate::convert::{ConversionFailure, FailureCause};
use crate::html::RewriteError;

/// EPUB pipeline errors
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("EPUB source not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Invalid EPUB archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid EPUB container: {0}")]
    InvalidContainer(String),

    #[error("Failed to parse {file}: {source}")]
    Xml {
        file: String,
        #[source]
        source: quick_xml::de::DeError,
    },

    #[error("Failed to rewrite {item}: {message}")]
    Rewrite { item: String, message: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Renderer produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<mupdf::Error> for EpubError {
    fn from(err: mupdf::Error) -> Self {
        EpubError::Render(err.to_string())
    }
}

impl EpubError {
    pub(crate) fn rewrite(item: &str, err: RewriteError) -> Self {
        EpubError::Rewrite {
            item: item.to_string(),
            message: err.to_string(),
        }
    }

    pub fn cause(&self) -> FailureCause {
        match self {
            EpubError::SourceMissing(_)
            | EpubError::Archive(_)
            | EpubError::InvalidContainer(_)
            | EpubError::Xml { .. } => FailureCause::InvalidContainer,
            EpubError::Rewrite { .. } | EpubError::Render(_) => FailureCause::RenderFailed,
            EpubError::MissingOutput(_) => FailureCause::MissingOutput,
            EpubError::Io(_) => FailureCause::Io,
        }
    }
}

impl From<EpubError> for ConversionFailure {
    fn from(err: EpubError) -> Self {
        ConversionFailure::new(err.cause(), err.to_string())
    }
}
