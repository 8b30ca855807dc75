//! Capability registry
//!
//! Answers "can this pipeline run" without running it:
//!
//! - EPUB: decided once at startup from the engine self-test and the
//!   `EPUB_ENABLED` switch, never changed afterwards.
//! - Office: a short `--version` query. Answers younger than the cache window
//!   are reused and concurrent callers share one query. The answer is a
//!   point-in-time observation and may be stale by the time a conversion runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::process::Command;

use crate::config::{Config, OfficeConfig};
use crate::formats::epub::HtmlRenderer;
use crate::process::run_bounded;

/// Result of the most recent office converter query
#[derive(Debug, Clone)]
pub struct ProbeSnapshot {
    pub available: bool,
    /// First line of the `--version` output
    pub version: Option<String>,
    pub checked_at: Instant,
}

#[derive(Debug)]
struct Inner {
    epub_available: bool,
    epub_engine: &'static str,
    office_binary: PathBuf,
    probe_timeout: Duration,
    probe_cache: Duration,
    office: RwLock<Option<ProbeSnapshot>>,
    /// Held while a `--version` query is in flight
    refresh: tokio::sync::Mutex<()>,
}

/// Process-wide capability flags, cheap to clone
#[derive(Debug, Clone)]
pub struct Capabilities {
    inner: Arc<Inner>,
}

impl Capabilities {
    pub fn new(epub_available: bool, epub_engine: &'static str, office: &OfficeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                epub_available,
                epub_engine,
                office_binary: office.binary.clone(),
                probe_timeout: office.probe_timeout,
                probe_cache: office.probe_cache,
                office: RwLock::new(None),
                refresh: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Run the startup checks: engine self-test and a first office query
    pub async fn detect(config: &Config, engine: Arc<dyn HtmlRenderer>) -> Self {
        let name = engine.name();
        let epub_available = if !config.epub.enabled {
            tracing::info!("EPUB conversion disabled by configuration");
            false
        } else {
            match tokio::task::spawn_blocking(move || engine.self_test()).await {
                Ok(Ok(())) => {
                    tracing::info!(engine = name, "EPUB engine loaded");
                    true
                }
                Ok(Err(e)) => {
                    tracing::warn!(engine = name, "EPUB engine unavailable: {}", e);
                    false
                }
                Err(e) => {
                    tracing::warn!(engine = name, "EPUB engine self-test crashed: {}", e);
                    false
                }
            }
        };

        let capabilities = Self::new(epub_available, name, &config.office);

        if capabilities.refresh_office().await {
            tracing::info!(binary = %config.office.binary.display(), "Office converter available");
        } else {
            tracing::warn!(
                binary = %config.office.binary.display(),
                "Office converter not available, PPT/PPTX conversions will fail"
            );
        }

        capabilities
    }

    pub fn epub_available(&self) -> bool {
        self.inner.epub_available
    }

    pub fn epub_engine(&self) -> &'static str {
        self.inner.epub_engine
    }

    pub fn office_binary(&self) -> &Path {
        &self.inner.office_binary
    }

    /// Office converter availability, reusing an answer younger than the cache window
    pub async fn office_available(&self) -> bool {
        if let Some(available) = self.cached_office() {
            return available;
        }

        let _guard = self.inner.refresh.lock().await;
        // Another caller may have finished a query while this one waited
        if let Some(available) = self.cached_office() {
            return available;
        }
        self.query_office().await
    }

    /// Query the office converter now and record the answer
    pub async fn refresh_office(&self) -> bool {
        let _guard = self.inner.refresh.lock().await;
        self.query_office().await
    }

    fn cached_office(&self) -> Option<bool> {
        self.inner
            .office
            .read()
            .as_ref()
            .filter(|snapshot| snapshot.checked_at.elapsed() < self.inner.probe_cache)
            .map(|snapshot| snapshot.available)
    }

    async fn query_office(&self) -> bool {
        let mut cmd = Command::new(&self.inner.office_binary);
        cmd.arg("--version");

        let snapshot = match run_bounded(cmd, self.inner.probe_timeout).await {
            Ok(output) if output.success() => ProbeSnapshot {
                available: true,
                version: output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string),
                checked_at: Instant::now(),
            },
            Ok(output) => {
                tracing::debug!(exit_code = ?output.exit_code(), "Office version query failed");
                ProbeSnapshot {
                    available: false,
                    version: None,
                    checked_at: Instant::now(),
                }
            }
            Err(e) => {
                tracing::debug!("Office version query failed: {}", e);
                ProbeSnapshot {
                    available: false,
                    version: None,
                    checked_at: Instant::now(),
                }
            }
        };

        let available = snapshot.available;
        *self.inner.office.write() = Some(snapshot);
        available
    }

    /// Last recorded office query, if any
    pub fn office_snapshot(&self) -> Option<ProbeSnapshot> {
        self.inner.office.read().clone()
    }
}
