//! Read-only status projection over the store, for polling clients.
//!
//! No business logic lives here; reads reflect the latest committed
//! pipeline state at the time of the call. Push delivery of the same
//! transitions is handled by the progress broadcast (see `ws`).

use crate::error::{ServiceError, ServiceResult};
use crate::service::ExtractionService;
use crate::store::{Document, DocumentId, ProcessingStep};

impl ExtractionService {
    /// Documents for one owner, in upload order.
    pub fn list_documents(&self, owner_id: i64) -> ServiceResult<Vec<Document>> {
        self.store.list_documents(owner_id).map_err(Into::into)
    }

    pub fn document(&self, document_id: DocumentId) -> ServiceResult<Document> {
        self.store
            .get_document(document_id)?
            .ok_or(ServiceError::DocumentNotFound { document_id })
    }

    /// Step records for one document, in stage order.
    pub fn document_steps(&self, document_id: DocumentId) -> ServiceResult<Vec<ProcessingStep>> {
        // Distinguish "no steps yet" from "no such document".
        let _ = self.document(document_id)?;
        self.store
            .steps_for_document(document_id)
            .map_err(Into::into)
    }
}
