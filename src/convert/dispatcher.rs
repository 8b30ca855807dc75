//! Routes validated requests to the matching pipeline

use std::time::Instant;

use super::{ConversionFailure, ConversionRequest, ConversionResult, DocumentKind, FailureCause};
use crate::formats::epub::EpubRenderer;
use crate::formats::office::ExternalPdfConverter;
use crate::probe::Capabilities;

/// Longest stderr excerpt written to the log
const LOG_EXCERPT_CHARS: usize = 2000;

/// Picks a pipeline by document kind and reports a uniform result
#[derive(Debug, Clone)]
pub struct ConversionDispatcher {
    capabilities: Capabilities,
    epub: EpubRenderer,
    office: ExternalPdfConverter,
}

impl ConversionDispatcher {
    pub fn new(
        capabilities: Capabilities,
        epub: EpubRenderer,
        office: ExternalPdfConverter,
    ) -> Self {
        Self {
            capabilities,
            epub,
            office,
        }
    }

    pub async fn convert(&self, request: &ConversionRequest<'_>) -> ConversionResult {
        let started = Instant::now();

        let result = match request.kind {
            DocumentKind::Epub if !self.capabilities.epub_available() => Err(ConversionFailure::new(
                FailureCause::DependencyUnavailable,
                "EPUB rendering engine is not available",
            )),
            DocumentKind::Epub => self.epub.render(&request.input_path, request.workspace).await,
            DocumentKind::Ppt | DocumentKind::Pptx => {
                self.office.convert(&request.input_path, request.workspace).await
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(artifact) => tracing::info!(
                workspace = %request.workspace.id(),
                file_name = %request.original_name,
                kind = %request.kind,
                size = artifact.size,
                elapsed_ms,
                "Conversion succeeded"
            ),
            Err(failure) => log_failure(request, failure, elapsed_ms),
        }

        result
    }
}

fn log_failure(request: &ConversionRequest<'_>, failure: &ConversionFailure, elapsed_ms: u64) {
    match &failure.diagnostics {
        Some(d) => tracing::warn!(
            workspace = %request.workspace.id(),
            file_name = %request.original_name,
            kind = %request.kind,
            cause = %failure.cause,
            exit_code = ?d.exit_code,
            stderr = %excerpt(&d.stderr),
            stdout = %excerpt(&d.stdout),
            output_listing = ?d.output_listing,
            elapsed_ms,
            "Conversion failed: {}",
            failure.message
        ),
        None => tracing::warn!(
            workspace = %request.workspace.id(),
            file_name = %request.original_name,
            kind = %request.kind,
            cause = %failure.cause,
            elapsed_ms,
            "Conversion failed: {}",
            failure.message
        ),
    }
}

fn excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(LOG_EXCERPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
