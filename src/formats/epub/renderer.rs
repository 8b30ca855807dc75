//! EPUB rendering pipeline
//!
//! ```text
//! book.epub ──parse──▶ items ──images──▶ assets/<basename>
//!                        └──documents──▶ flatten refs ──▶ concat
//!                                                           │
//!                            assets/vellum-combined.html ◀──┘
//!                                  └──engine──▶ output/<stem>.pdf
//! ```
//!
//! Preparation and rendering are blocking and run together on the blocking
//! pool under the configured time limit.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::container::{EpubDocument, DEFAULT_EXTRACTION_LIMIT};
use super::engine::{HtmlRenderer, PageSetup};
use super::EpubError;
use crate::convert::{ConversionFailure, ConversionResult, Diagnostics, FailureCause, PdfArtifact};
use crate::html::{combine_documents, flatten_references};
use crate::workspace::Workspace;

/// File name of the concatenated document inside the assets directory
pub const COMBINED_DOCUMENT: &str = "vellum-combined.html";

/// An image written into the flat assets directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAsset {
    /// Basename the asset is stored and referenced under
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Everything the engine needs, laid out on disk
#[derive(Debug, Clone)]
pub struct PreparedBook {
    pub html_path: PathBuf,
    pub assets: Vec<ExtractedAsset>,
    /// Number of document items concatenated into the combined file
    pub documents: usize,
}

/// Unpack `source` into `assets_dir` and write the combined document there.
///
/// At most `limit` decompressed bytes are read from the container.
pub fn prepare_book(
    source: &Path,
    assets_dir: &Path,
    limit: u64,
) -> Result<PreparedBook, EpubError> {
    let book = EpubDocument::open(source, limit)?;

    let mut assets = Vec::new();
    let mut seen = HashSet::new();
    for item in book.images() {
        let name = item.basename();
        if matches!(name, "" | "." | "..") || name == COMBINED_DOCUMENT {
            tracing::warn!(item = %item.id, name = %item.name, "Skipping image with unusable name");
            continue;
        }
        if !seen.insert(name.to_string()) {
            tracing::warn!(
                item = %item.id,
                asset = %name,
                "Asset basename collision, later item overwrites earlier one"
            );
        }

        let path = assets_dir.join(name);
        std::fs::write(&path, &item.content)?;
        assets.push(ExtractedAsset {
            name: name.to_string(),
            path,
            size: item.content.len() as u64,
        });
    }

    let mut rewritten = Vec::new();
    for item in book.documents() {
        let text = String::from_utf8_lossy(&item.content);
        let flattened = flatten_references(&text).map_err(|e| EpubError::rewrite(&item.id, e))?;
        rewritten.push(flattened);
    }

    if rewritten.is_empty() {
        return Err(EpubError::InvalidContainer(
            "container has no document items".to_string(),
        ));
    }

    let title = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let html = combine_documents(&title, rewritten.iter().map(String::as_str));
    let html_path = assets_dir.join(COMBINED_DOCUMENT);
    std::fs::write(&html_path, html)?;

    tracing::debug!(
        assets = assets.len(),
        documents = rewritten.len(),
        html = %html_path.display(),
        "EPUB prepared for rendering"
    );

    Ok(PreparedBook {
        html_path,
        assets,
        documents: rewritten.len(),
    })
}

/// Renders EPUB containers to PDF through an [`HtmlRenderer`]
#[derive(Clone)]
pub struct EpubRenderer {
    engine: Arc<dyn HtmlRenderer>,
    page: PageSetup,
    timeout: Duration,
    extraction_limit: u64,
}

impl EpubRenderer {
    pub fn new(engine: Arc<dyn HtmlRenderer>, timeout: Duration) -> Self {
        Self {
            engine,
            page: PageSetup::default(),
            timeout,
            extraction_limit: DEFAULT_EXTRACTION_LIMIT,
        }
    }

    /// Cap on decompressed bytes read from one container
    pub fn with_extraction_limit(mut self, limit: u64) -> Self {
        self.extraction_limit = limit;
        self
    }

    /// Render `source` into the workspace output directory.
    ///
    /// Never panics or errors past this boundary: every failure is reported
    /// as a [`ConversionFailure`].
    pub async fn render(&self, source: &Path, workspace: &Workspace) -> ConversionResult {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string());
        let output = workspace.output_dir().join(format!("{}.pdf", stem));

        let engine = Arc::clone(&self.engine);
        let page = self.page;
        let limit = self.extraction_limit;
        let source = source.to_path_buf();
        let assets_dir = workspace.assets_dir();
        let started = Instant::now();

        // The blocking render cannot be interrupted; on timeout it is left to
        // finish on its own and its output is discarded with the workspace.
        let result = timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || {
                render_blocking(engine.as_ref(), &source, &assets_dir, &output, &page, limit)
            }),
        )
        .await;

        let elapsed = started.elapsed();
        let diagnostics = Diagnostics {
            elapsed: Some(elapsed),
            ..Diagnostics::default()
        };

        match result {
            Ok(Ok(Ok(artifact))) => {
                tracing::info!(
                    workspace = %workspace.id(),
                    engine = self.engine.name(),
                    size = artifact.size,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "EPUB rendered"
                );
                Ok(artifact)
            }
            Ok(Ok(Err(e))) => Err(ConversionFailure::from(e).with_diagnostics(diagnostics)),
            Ok(Err(join_error)) => Err(ConversionFailure::new(
                FailureCause::Internal,
                format!("render task failed: {}", join_error),
            )
            .with_diagnostics(diagnostics)),
            Err(_) => Err(ConversionFailure::new(
                FailureCause::Timeout,
                format!("EPUB render exceeded {}s", self.timeout.as_secs()),
            )
            .with_diagnostics(diagnostics)),
        }
    }
}

impl std::fmt::Debug for EpubRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpubRenderer")
            .field("engine", &self.engine.name())
            .field("page", &self.page)
            .field("timeout", &self.timeout)
            .field("extraction_limit", &self.extraction_limit)
            .finish()
    }
}

fn render_blocking(
    engine: &dyn HtmlRenderer,
    source: &Path,
    assets_dir: &Path,
    output: &Path,
    page: &PageSetup,
    limit: u64,
) -> Result<PdfArtifact, EpubError> {
    let book = prepare_book(source, assets_dir, limit)?;
    engine.render_to_pdf(&book.html_path, output, page)?;

    if !output.is_file() {
        return Err(EpubError::MissingOutput(output.to_path_buf()));
    }
    Ok(PdfArtifact::from_path(output)?)
}
