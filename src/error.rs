//! Error types for the Vellum server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::convert::{ConversionFailure, DocumentKind};
use crate::workspace::WorkspaceError;

/// Client-facing message for every failed conversion
pub const CONVERSION_FAILED_MESSAGE: &str = "conversion failed, please check the file format";

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    #[error("No renderer available for {file_type}")]
    DependencyUnavailable { file_type: DocumentKind },

    #[error("Conversion of {file_type} failed: {failure}")]
    Conversion {
        failure: ConversionFailure,
        file_type: DocumentKind,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Map a pipeline failure, keeping dependency problems distinguishable
    pub fn conversion(failure: ConversionFailure, file_type: DocumentKind) -> Self {
        if failure.cause == crate::convert::FailureCause::DependencyUnavailable {
            AppError::DependencyUnavailable { file_type }
        } else {
            AppError::Conversion { failure, file_type }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::validation(format!("invalid upload: {}", err.body_text()))
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<DocumentKind>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, file_type) = match self {
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message, None),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "file exceeds the maximum upload size".to_string(),
                None,
            ),
            AppError::DependencyUnavailable { file_type } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} conversion is not available on this server", file_type),
                Some(file_type),
            ),
            // Causes and diagnostics were logged by the dispatcher
            AppError::Conversion { file_type, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                CONVERSION_FAILED_MESSAGE.to_string(),
                Some(file_type),
            ),
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an internal error occurred".to_string(),
                    None,
                )
            }
            AppError::Workspace(e) => {
                tracing::error!("Workspace error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an internal error occurred".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorResponse { error, file_type })).into_response()
    }
}
