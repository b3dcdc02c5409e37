use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: i64 },

    #[error("No export is available for document {document_id}")]
    ArtifactNotReady { document_id: i64 },

    #[error("Storage error")]
    Store(#[from] StoreError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{collection} record not found: {id}")]
    NotFound { collection: &'static str, id: i64 },

    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),
}

/// Failures reported by the stage adapters (extractors and serializer).
///
/// These are absorbed by the pipeline and recorded on the failing step;
/// they never propagate past the orchestrator boundary.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Connection failed to {url}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Extraction engine failed (status {status}): {message}")]
    Engine { status: u16, message: String },

    #[error("Invalid response from extraction engine")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("{message}")]
    Failed { message: String },
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } | ServiceError::ArtifactNotReady { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::ArtifactNotReady { .. } => "artifact_not_ready",
            ServiceError::Store(StoreError::NotFound { .. }) => "record_not_found",
            ServiceError::Store(_) => "store_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::FileTooLarge { .. } => "file_too_large",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
