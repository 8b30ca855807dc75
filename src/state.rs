//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::convert::ConversionDispatcher;
use crate::formats::epub::{EpubRenderer, HtmlRenderer};
use crate::formats::office::ExternalPdfConverter;
use crate::probe::Capabilities;
use crate::workspace::{Workspace, WorkspaceError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    capabilities: Capabilities,
    dispatcher: ConversionDispatcher,
}

impl AppState {
    /// Wire both pipelines behind a dispatcher.
    ///
    /// `capabilities` is expected to come from [`Capabilities::detect`] run
    /// against the same `engine`.
    pub fn new(config: Config, engine: Arc<dyn HtmlRenderer>, capabilities: Capabilities) -> Self {
        let epub = EpubRenderer::new(engine, config.epub.render_timeout)
            .with_extraction_limit(config.epub.max_extracted_bytes);
        let office = ExternalPdfConverter::new(config.office.clone());
        let dispatcher = ConversionDispatcher::new(capabilities.clone(), epub, office);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                capabilities,
                dispatcher,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    pub fn dispatcher(&self) -> &ConversionDispatcher {
        &self.inner.dispatcher
    }

    /// Create a scratch directory for one request
    pub fn new_workspace(&self) -> Result<Workspace, WorkspaceError> {
        Workspace::create(self.inner.config.upload.workspace_root.as_deref())
    }
}
