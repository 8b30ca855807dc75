//! Conversion requests, artifacts and outcomes
//!
//! Both pipelines report through the same vocabulary: a successful run yields
//! a [`PdfArtifact`], a failed one a [`ConversionFailure`] tagged with a
//! [`FailureCause`]. Nothing else crosses from a pipeline into the dispatcher.

mod dispatcher;

pub use dispatcher::ConversionDispatcher;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::workspace::Workspace;

/// Upload formats the server converts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Epub,
    Ppt,
    Pptx,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Epub, DocumentKind::Ppt, DocumentKind::Pptx];

    /// Match an extension without the leading dot, ignoring case
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "epub" => Some(Self::Epub),
            "ppt" => Some(Self::Ppt),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    /// Classify a filename by the text after its last dot
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A validated upload staged inside its workspace
#[derive(Debug)]
pub struct ConversionRequest<'a> {
    pub input_path: PathBuf,
    pub original_name: String,
    pub kind: DocumentKind,
    pub workspace: &'a Workspace,
}

impl<'a> ConversionRequest<'a> {
    pub fn new(
        workspace: &'a Workspace,
        input_path: PathBuf,
        original_name: impl Into<String>,
        kind: DocumentKind,
    ) -> Self {
        Self {
            input_path,
            original_name: original_name.into(),
            kind,
            workspace,
        }
    }

    /// Build a request from a staged file, deriving the kind from its extension
    pub fn from_path(workspace: &'a Workspace, input_path: PathBuf) -> Option<Self> {
        let name = input_path.file_name()?.to_string_lossy().into_owned();
        let kind = DocumentKind::from_file_name(&name)?;
        Some(Self::new(workspace, input_path, name, kind))
    }
}

/// A rendered PDF on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfArtifact {
    pub path: PathBuf,
    pub size: u64,
}

impl PdfArtifact {
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self { path, size })
    }

    /// Load the artifact into memory for delivery
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// Why a conversion did not produce an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    /// The rendering engine for this format is not available
    DependencyUnavailable,
    /// The uploaded container could not be read
    InvalidContainer,
    /// The rendering engine raised an error
    RenderFailed,
    Timeout,
    /// The external tool could not be started
    LaunchFailed,
    NonZeroExit,
    /// The tool reported success without producing the expected file
    MissingOutput,
    Io,
    Internal,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependencyUnavailable => "dependency-unavailable",
            Self::InvalidContainer => "invalid-container",
            Self::RenderFailed => "render-failed",
            Self::Timeout => "timeout",
            Self::LaunchFailed => "launch-failed",
            Self::NonZeroExit => "non-zero-exit",
            Self::MissingOutput => "missing-output",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-facing context for a failed conversion. Never sent to clients.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Entries of the output directory at the time of failure
    pub output_listing: Vec<String>,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Error)]
#[error("{cause}: {message}")]
pub struct ConversionFailure {
    pub cause: FailureCause,
    pub message: String,
    pub diagnostics: Option<Diagnostics>,
}

impl ConversionFailure {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

/// Outcome of a single conversion attempt
pub type ConversionResult = Result<PdfArtifact, ConversionFailure>;
