//! Background dispatch of pipeline runs.
//!
//! Freshly created documents are handed to a small pool of worker tasks
//! over a channel, so the upload request returns immediately. Runs are
//! supervised: run-level errors and panics are written back to the
//! document instead of being dropped, and a failed dispatch marks the
//! document `error` before control returns to the caller.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::service::ExtractionService;
use crate::store::{DocumentId, DocumentPatch, DocumentStatus};

/// Handle for scheduling pipeline runs on the worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<ExtractionService>,
    tx: mpsc::UnboundedSender<DocumentId>,
}

impl Dispatcher {
    /// Start the pipeline workers and return the dispatch handle.
    /// Should be called once on server startup.
    pub fn start(service: Arc<ExtractionService>, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..worker_count.max(1) {
            let service = service.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                info!(worker_id, "Pipeline worker started");
                loop {
                    let document_id = { rx.lock().await.recv().await };
                    let Some(document_id) = document_id else {
                        info!(worker_id, "Pipeline worker stopping");
                        break;
                    };
                    run_supervised(&service, document_id).await;
                }
            });
        }

        Self { service, tx }
    }

    /// Schedule a pipeline run without blocking.
    ///
    /// A document handed to this method is never silently dropped: if
    /// scheduling fails, it is marked `error` before the error returns.
    pub fn dispatch(&self, document_id: DocumentId) -> ServiceResult<()> {
        if self.tx.send(document_id).is_err() {
            let message = "document processing could not be scheduled";
            error!(doc_id = document_id, "{message}");
            record_failure(&self.service, document_id, message);
            return Err(ServiceError::Internal {
                message: message.to_string(),
            });
        }
        Ok(())
    }

    /// A dispatcher whose workers are gone, for exercising the
    /// scheduling-failure path.
    #[cfg(test)]
    pub(crate) fn closed(service: Arc<ExtractionService>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Self { service, tx }
    }
}

async fn run_supervised(service: &Arc<ExtractionService>, document_id: DocumentId) {
    // The run gets its own task so a panic is contained and recorded.
    let runner = service.clone();
    let handle = tokio::spawn(async move { runner.run_pipeline(document_id).await });

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(doc_id = document_id, error = %e, "Pipeline run failed");
            record_failure(service, document_id, &format!("processing failed: {e}"));
        }
        Err(e) => {
            error!(doc_id = document_id, error = %e, "Pipeline task panicked");
            record_failure(service, document_id, "processing task failed unexpectedly");
        }
    }
}

/// Best-effort terminal error write. Skipped when the document is gone
/// or already terminal, so a run never gets a second terminal status.
fn record_failure(service: &ExtractionService, document_id: DocumentId, message: &str) {
    let document = match service.store.get_document(document_id) {
        Ok(Some(document)) => document,
        Ok(None) => return,
        Err(e) => {
            warn!(doc_id = document_id, error = %e, "Failed to look up document for failure record");
            return;
        }
    };
    if document.status.is_terminal() {
        return;
    }

    match service.store.update_document(
        document_id,
        DocumentPatch {
            status: Some(DocumentStatus::Error),
            completed_at: Some(Utc::now()),
            error_message: Some(message.to_string()),
            ..DocumentPatch::default()
        },
    ) {
        Ok(_) => {
            service
                .progress
                .document(document_id, DocumentStatus::Error, Some(message), None);
        }
        Err(e) => {
            warn!(doc_id = document_id, error = %e, "Failed to mark document as failed");
        }
    }
}
