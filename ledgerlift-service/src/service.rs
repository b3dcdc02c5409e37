//! Service coordinator: owns the store, the stage adapters, the
//! progress channel, and the per-document cancellation registry, and
//! implements the document lifecycle operations the API layer calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::StaticConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{OpticalRecognition, SemanticExtraction, TextExtraction};
use crate::pipeline::ProgressChannel;
use crate::serialize::RecordSerializer;
use crate::store::{
    Document, DocumentId, DocumentPatch, DocumentStatus, DocumentStore, NewDocument, NewStep,
    StepName, StepStatus,
};

pub struct ExtractionService {
    pub config: StaticConfig,
    pub store: Arc<dyn DocumentStore>,
    pub text: Arc<dyn TextExtraction>,
    pub optical: Arc<dyn OpticalRecognition>,
    pub semantic: Arc<dyn SemanticExtraction>,
    pub serializer: Arc<dyn RecordSerializer>,
    pub progress: ProgressChannel,
    /// Cancellation tokens for in-flight pipeline runs.
    pub(crate) run_tokens: DashMap<DocumentId, CancellationToken>,
}

impl ExtractionService {
    pub fn new(
        config: StaticConfig,
        store: Arc<dyn DocumentStore>,
        text: Arc<dyn TextExtraction>,
        optical: Arc<dyn OpticalRecognition>,
        semantic: Arc<dyn SemanticExtraction>,
        serializer: Arc<dyn RecordSerializer>,
    ) -> Self {
        Self {
            config,
            store,
            text,
            optical,
            semantic,
            serializer,
            progress: ProgressChannel::default(),
            run_tokens: DashMap::new(),
        }
    }

    fn uploads_dir(&self) -> PathBuf {
        self.config.storage.data_dir.join("uploads")
    }

    fn exports_dir(&self) -> PathBuf {
        self.config.storage.data_dir.join("exports")
    }

    /// Accept an upload: persist the bytes, create the document record
    /// in `processing` status, and create its five step records with
    /// the upload stage pre-marked completed.
    ///
    /// The caller is responsible for dispatching the pipeline run.
    pub async fn create_document(
        &self,
        content: &[u8],
        filename: &str,
        owner_id: i64,
    ) -> ServiceResult<Document> {
        let max = self.config.pipeline.max_document_size_bytes;
        if content.len() as u64 > max {
            return Err(ServiceError::FileTooLarge {
                size: content.len() as u64,
                max,
            });
        }

        let filename = sanitize_filename(filename);
        let document = self.store.create_document(NewDocument {
            owner_id,
            filename: filename.clone(),
            original_size: content.len() as i64,
            status: DocumentStatus::Processing,
            source_path: None,
        })?;

        let uploads = self.uploads_dir();
        std::fs::create_dir_all(&uploads).map_err(storage_error)?;
        let source_path = uploads.join(format!("{}_{}", document.id, filename));
        std::fs::write(&source_path, content).map_err(storage_error)?;

        let document = self.store.update_document(
            document.id,
            DocumentPatch {
                source_path: Some(source_path.to_string_lossy().to_string()),
                ..DocumentPatch::default()
            },
        )?;

        for step_name in StepName::SEQUENCE {
            let status = if step_name == StepName::Upload {
                StepStatus::Completed
            } else {
                StepStatus::Pending
            };
            self.store.create_step(NewStep {
                document_id: document.id,
                step_name,
                status,
            })?;
        }

        info!(
            doc_id = document.id,
            filename = %document.filename,
            size = document.original_size,
            "Document uploaded and queued for processing"
        );

        Ok(document)
    }

    /// Delete a document: cancel any in-progress run first, then remove
    /// its files and records.
    pub fn delete_document(&self, document_id: DocumentId) -> ServiceResult<bool> {
        if self.cancel_run(document_id) {
            info!(
                doc_id = document_id,
                "Cancelled in-progress processing for deleted document"
            );
        }

        let Some(document) = self.store.get_document(document_id)? else {
            return Ok(false);
        };

        if let Some(path) = self.artifact_path(&document) {
            remove_file_if_exists(&path);
        }
        if let Some(source) = document.source_path.as_deref() {
            remove_file_if_exists(Path::new(source));
        }

        self.store.delete_document(document_id).map_err(Into::into)
    }

    /// Absolute path of a document's CSV artifact, if one has been set.
    pub fn artifact_path(&self, document: &Document) -> Option<PathBuf> {
        document
            .artifact_ref
            .as_deref()
            .map(|r| self.config.storage.data_dir.join(r))
    }

    /// Persist export bytes; returns the data-dir-relative artifact
    /// reference stored on the document.
    pub(crate) fn write_artifact(&self, bytes: &[u8]) -> std::io::Result<String> {
        let exports = self.exports_dir();
        std::fs::create_dir_all(&exports)?;
        let name = format!("{}.csv", uuid::Uuid::new_v4());
        std::fs::write(exports.join(&name), bytes)?;
        Ok(format!("exports/{name}"))
    }

    /// Remove the uploaded bytes once the pipeline is done with them.
    pub(crate) fn cleanup_source_file(&self, document: &Document) {
        if let Some(source) = document.source_path.as_deref() {
            remove_file_if_exists(Path::new(source));
        }
    }
}

fn storage_error(e: std::io::Error) -> ServiceError {
    ServiceError::Internal {
        message: format!("file storage error: {e}"),
    }
}

fn remove_file_if_exists(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}

/// Uploaded filenames come from the client; keep only a safe basename.
fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "document.pdf".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("budget.pdf"), "budget.pdf");
        assert_eq!(sanitize_filename("fy 2023 report.pdf"), "fy 2023 report.pdf");
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("dir\\evil.pdf"), "evil.pdf");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("..."), "document.pdf");
    }
}
