//! Cancellation token management for running pipelines.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::service::ExtractionService;
use crate::store::DocumentId;

impl ExtractionService {
    /// Register a cancellation token for a document being processed.
    pub(crate) fn register_run_token(&self, document_id: DocumentId) -> CancellationToken {
        let token = CancellationToken::new();
        self.run_tokens.insert(document_id, token.clone());
        token
    }

    /// Cancel the run for a document if one is in progress.
    pub(crate) fn cancel_run(&self, document_id: DocumentId) -> bool {
        if let Some((_, token)) = self.run_tokens.remove(&document_id) {
            token.cancel();
            info!(doc_id = document_id, "Pipeline cancellation triggered");
            true
        } else {
            false
        }
    }

    /// Remove a cancellation token when a run finishes normally.
    pub(crate) fn unregister_run_token(&self, document_id: DocumentId) {
        self.run_tokens.remove(&document_id);
    }
}
