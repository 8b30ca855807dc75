//! Health and capability endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::convert::DocumentKind;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub epub_support: bool,
    pub ppt_support: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilityReport {
    pub status: &'static str,
    pub version: &'static str,
    pub max_file_size_mb: u64,
    pub supported_extensions: Vec<DocumentKind>,
    pub epub_support: bool,
    pub epub_engine: &'static str,
    pub office_binary: String,
    /// Version line from the most recent office query
    pub office_version: Option<String>,
}

/// GET /health
///
/// Office availability comes from a short-lived cached query; the EPUB flag is fixed at startup.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let capabilities = state.capabilities();
    let ppt_support = capabilities.office_available().await;

    Json(HealthResponse {
        status: "ok",
        epub_support: capabilities.epub_available(),
        ppt_support,
    })
}

/// GET /test
pub async fn capability_report(State(state): State<AppState>) -> Json<CapabilityReport> {
    let capabilities = state.capabilities();

    Json(CapabilityReport {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        max_file_size_mb: state.config().upload.max_megabytes(),
        supported_extensions: DocumentKind::ALL.to_vec(),
        epub_support: capabilities.epub_available(),
        epub_engine: capabilities.epub_engine(),
        office_binary: capabilities.office_binary().display().to_string(),
        office_version: capabilities
            .office_snapshot()
            .and_then(|snapshot| snapshot.version),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/test", get(capability_report))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::config::Config;
    use crate::probe::Capabilities;
    use crate::test_support::{StubBehaviour, StubRenderer};

    async fn server(engine: StubBehaviour, office_binary: PathBuf) -> TestServer {
        server_with_cache(engine, office_binary, Duration::from_secs(60)).await
    }

    async fn server_with_cache(
        engine: StubBehaviour,
        office_binary: PathBuf,
        probe_cache: Duration,
    ) -> TestServer {
        let mut config = Config::default();
        config.office.binary = office_binary;
        config.office.probe_timeout = Duration::from_secs(5);
        config.office.probe_cache = probe_cache;

        let engine = Arc::new(StubRenderer::new(engine));
        let caps = Capabilities::detect(&config, engine.clone()).await;
        let state = AppState::new(config, engine, caps);
        TestServer::new(crate::routes::router(state)).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_missing_dependencies() {
        let missing = PathBuf::from("/nonexistent/soffice");
        let server = server(StubBehaviour::Unavailable, missing).await;

        let response = server.get("/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "status": "ok",
            "epub_support": false,
            "ppt_support": false,
        }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_health_reports_available_dependencies() {
        use crate::test_support::{fake_office, FakeOffice};

        let dir = tempfile::tempdir().unwrap();
        let office = fake_office(dir.path(), FakeOffice::Succeed);
        let server = server(StubBehaviour::Succeed, office).await;

        let body: Value = server.get("/health").await.json();

        assert_eq!(body["epub_support"], true);
        assert_eq!(body["ppt_support"], true);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repeated_health_checks_reuse_recent_answer() {
        use crate::test_support::{fake_office, version_queries, FakeOffice};

        let dir = tempfile::tempdir().unwrap();
        let office = fake_office(dir.path(), FakeOffice::Succeed);
        let server = server(StubBehaviour::Succeed, office.clone()).await;
        assert_eq!(version_queries(&office), 1);

        for _ in 0..5 {
            let body: Value = server.get("/health").await.json();
            assert_eq!(body["ppt_support"], true);
        }

        assert_eq!(version_queries(&office), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_health_requeries_after_cache_window() {
        use crate::test_support::{fake_office, version_queries, FakeOffice};

        let dir = tempfile::tempdir().unwrap();
        let office = fake_office(dir.path(), FakeOffice::Succeed);
        let server =
            server_with_cache(StubBehaviour::Succeed, office.clone(), Duration::ZERO).await;

        server.get("/health").await.assert_status_ok();
        server.get("/health").await.assert_status_ok();

        assert_eq!(version_queries(&office), 3);
    }

    #[tokio::test]
    async fn test_capability_report() {
        let server = server(StubBehaviour::Succeed, PathBuf::from("/opt/office/soffice")).await;

        let body: Value = server.get("/test").await.json();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["max_file_size_mb"], 50);
        assert_eq!(body["supported_extensions"], json!(["epub", "ppt", "pptx"]));
        assert_eq!(body["epub_support"], true);
        assert_eq!(body["office_binary"], "/opt/office/soffice");
    }
}
