//! Document API endpoints.
//!
//! Handlers for upload, listing, step polling, artifact download, and
//! deletion.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::store::{Document, ProcessingStep};

use super::AppState;

/// List documents query parameters
#[derive(Deserialize)]
pub struct ListDocumentsParams {
    pub owner_id: Option<i64>,
}

/// Response for delete operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

// TODO: derive the owner from authentication once an auth layer exists
const DEFAULT_OWNER_ID: i64 = 1;

/// List all documents for an owner
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsParams>,
) -> Result<Json<Vec<Document>>, ServiceError> {
    let owner_id = params.owner_id.unwrap_or(DEFAULT_OWNER_ID);
    let documents = state.service.list_documents(owner_id)?;
    Ok(Json(documents))
}

fn is_pdf(filename: &str, content_type: Option<&str>) -> bool {
    content_type == Some("application/pdf") || filename.to_lowercase().ends_with(".pdf")
}

/// Upload a new document and trigger its extraction pipeline
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, ServiceError> {
    let mut file_data: Option<(Vec<u8>, String)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        let content_type = field.content_type().map(|c| c.to_string());
        if !is_pdf(&filename, content_type.as_deref()) {
            return Err(ServiceError::InvalidRequest {
                message: "Only PDF files are allowed".to_string(),
            });
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::InvalidRequest {
                message: e.to_string(),
            })?;
        file_data = Some((data.to_vec(), filename));
    }

    let (data, filename) = file_data.ok_or_else(|| ServiceError::InvalidRequest {
        message: "No file provided".to_string(),
    })?;

    let document = state
        .service
        .create_document(&data, &filename, DEFAULT_OWNER_ID)
        .await?;

    // The document is marked `error` by the dispatcher if this fails.
    state.dispatcher.dispatch(document.id)?;

    Ok(Json(document))
}

/// Get a specific document by ID
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Document>, ServiceError> {
    Ok(Json(state.service.document(id)?))
}

/// Get the processing steps for a document
pub async fn get_document_steps_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProcessingStep>>, ServiceError> {
    Ok(Json(state.service.document_steps(id)?))
}

/// Download the CSV artifact for a completed document
pub async fn download_artifact_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let document = state.service.document(id)?;

    let artifact_path = state
        .service
        .artifact_path(&document)
        .ok_or(ServiceError::ArtifactNotReady { document_id: id })?;

    let bytes = tokio::fs::read(&artifact_path)
        .await
        .map_err(|_| ServiceError::ArtifactNotReady { document_id: id })?;

    let export_name = format!(
        "{}.csv",
        document
            .filename
            .strip_suffix(".pdf")
            .unwrap_or(&document.filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{export_name}\""),
            ),
        ],
        bytes,
    ))
}

/// Delete a document, cancelling its pipeline run if one is in progress
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    let deleted = state.service.delete_document(id)?;

    if deleted {
        Ok(Json(DeleteResponse {
            success: true,
            message: "Document deleted successfully".to_string(),
        }))
    } else {
        Err(ServiceError::DocumentNotFound { document_id: id })
    }
}
