//! Conversion endpoint
//!
//! POST /convert - multipart upload (field `file`), responds with the PDF as
//! an attachment

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use super::filename::{download_name, sanitize_file_name};
use crate::convert::{ConversionRequest, DocumentKind};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::workspace::Workspace;

/// Multipart field carrying the document
const FILE_FIELD: &str = "file";

pub const NO_FILE_MESSAGE: &str = "no file uploaded";
pub const EMPTY_FILENAME_MESSAGE: &str = "empty filename";
pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "unsupported file format";

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/convert", post(convert_document))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

struct Upload {
    file_name: String,
    data: Vec<u8>,
}

async fn convert_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response> {
    let upload = read_upload(&mut multipart).await?;

    let kind = DocumentKind::from_file_name(&upload.file_name)
        .ok_or_else(|| AppError::validation(UNSUPPORTED_FORMAT_MESSAGE))?;
    let file_name = sanitize_file_name(&upload.file_name, kind);

    tracing::info!(
        original = %upload.file_name,
        file_name = %file_name,
        size = upload.data.len(),
        "Conversion requested"
    );

    let workspace = state.new_workspace()?;
    let outcome = convert_in(&state, &workspace, &file_name, kind, &upload.data).await;

    // Bytes are already in memory; the workspace goes regardless of outcome
    let workspace_id = workspace.id();
    if let Err(e) = workspace.close().await {
        tracing::warn!(workspace = %workspace_id, "Workspace cleanup failed: {}", e);
    }

    let pdf = outcome?;
    let disposition = format!("attachment; filename=\"{}\"", download_name(&upload.file_name));

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A part without a filename is a plain form value, not a file
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if file_name.trim().is_empty() {
            return Err(AppError::validation(EMPTY_FILENAME_MESSAGE));
        }

        let data = field.bytes().await?;
        tracing::debug!("Read {} bytes of upload {}", data.len(), file_name);

        return Ok(Upload {
            file_name,
            data: data.to_vec(),
        });
    }

    Err(AppError::validation(NO_FILE_MESSAGE))
}

async fn convert_in(
    state: &AppState,
    workspace: &Workspace,
    file_name: &str,
    kind: DocumentKind,
    data: &[u8],
) -> Result<Vec<u8>> {
    let input_path = workspace.write_input(file_name, data).await?;
    let request = ConversionRequest::new(workspace, input_path, file_name, kind);

    let artifact = state
        .dispatcher()
        .convert(&request)
        .await
        .map_err(|failure| AppError::conversion(failure, kind))?;

    Ok(artifact.read().await?)
}
