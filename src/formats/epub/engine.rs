//! HTML-to-PDF engines
//!
//! The EPUB pipeline hands a single combined HTML file to an [`HtmlRenderer`].
//! [`MupdfRenderer`] is the production engine: MuPDF lays the reflowable HTML
//! out into fixed pages and converts the result into a PDF document.
//!
//! MuPDF's `fz_context` is not thread-safe, so the renderer opens a fresh
//! document per call and never lets a MuPDF handle outlive it. Callers run it
//! on the blocking thread pool.

use std::path::Path;

use mupdf::Document;

use super::EpubError;

/// A4 width in points
pub const A4_WIDTH: f32 = 595.0;

/// A4 height in points
pub const A4_HEIGHT: f32 = 842.0;

/// Base em size for text layout (points)
pub const DEFAULT_EM_SIZE: f32 = 11.0;

const SELF_TEST_HTML: &str =
    "<!DOCTYPE html><html><body><h1>Vellum</h1><p>engine self-test</p></body></html>";

/// Page geometry used when laying out reflowable content
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSetup {
    /// Page width in points
    pub width: f32,
    /// Page height in points
    pub height: f32,
    /// Em size for font scaling
    pub em: f32,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            width: A4_WIDTH,
            height: A4_HEIGHT,
            em: DEFAULT_EM_SIZE,
        }
    }
}

/// Renders an HTML file, resolving relative references against its
/// directory, into a PDF file.
pub trait HtmlRenderer: Send + Sync {
    /// Engine name for logs and capability reports
    fn name(&self) -> &'static str;

    fn render_to_pdf(
        &self,
        html_path: &Path,
        output: &Path,
        page: &PageSetup,
    ) -> Result<(), EpubError>;

    /// Cheap end-to-end check run once at startup
    fn self_test(&self) -> Result<(), EpubError>;
}

/// MuPDF-backed engine
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfRenderer;

impl MupdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl HtmlRenderer for MupdfRenderer {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn render_to_pdf(
        &self,
        html_path: &Path,
        output: &Path,
        page: &PageSetup,
    ) -> Result<(), EpubError> {
        let html_path = path_str(html_path)?;
        let output_path = path_str(output)?;

        let mut doc = Document::open(html_path)?;
        if doc.is_reflowable()? {
            doc.layout(page.width, page.height, page.em)?;
        }

        let page_count = doc.page_count()?;
        if page_count <= 0 {
            return Err(EpubError::Render("document laid out to zero pages".to_string()));
        }

        let pdf = doc.convert_to_pdf(0, page_count - 1, 0)?;
        pdf.save(output_path)?;

        tracing::debug!(pages = page_count, output = %output.display(), "MuPDF render complete");
        Ok(())
    }

    fn self_test(&self) -> Result<(), EpubError> {
        let mut doc = Document::from_bytes(SELF_TEST_HTML.as_bytes(), "text/html")?;
        if doc.is_reflowable()? {
            let page = PageSetup::default();
            doc.layout(page.width, page.height, page.em)?;
        }
        if doc.page_count()? < 1 {
            return Err(EpubError::Render("self-test produced no pages".to_string()));
        }
        Ok(())
    }
}

fn path_str(path: &Path) -> Result<&str, EpubError> {
    path.to_str()
        .ok_or_else(|| EpubError::Render(format!("non UTF-8 path: {}", path.display())))
}
