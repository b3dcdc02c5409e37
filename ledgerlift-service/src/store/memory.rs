//! In-memory reference store: arena-style maps keyed by monotonic ids.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::models::{
    Document, DocumentId, DocumentPatch, NewDocument, NewStep, ProcessingStep, StepId, StepPatch,
};
use super::{DocumentStore, StoreResult};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    documents: HashMap<DocumentId, Document>,
    steps: HashMap<StepId, ProcessingStep>,
    next_document_id: DocumentId,
    next_step_id: StepId,
}

/// Process-local store. Record mutations are serialized by a single
/// mutex, which is sufficient for the single-writer-per-record
/// discipline the pipeline follows.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_document_id: 1,
                next_step_id: 1,
                ..Inner::default()
            }),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn create_document(&self, new: NewDocument) -> StoreResult<Document> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_document_id;
        inner.next_document_id += 1;

        let document = Document {
            id,
            owner_id: new.owner_id,
            filename: new.filename,
            original_size: new.original_size,
            status: new.status,
            source_path: new.source_path,
            uploaded_at: Utc::now(),
            completed_at: None,
            error_message: None,
            record_count: None,
            artifact_ref: None,
        };
        inner.documents.insert(id, document.clone());
        Ok(document)
    }

    fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.documents.get(&id).cloned())
    }

    fn list_documents(&self, owner_id: i64) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock().unwrap();
        let mut documents: Vec<Document> = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        // Ids are monotonic, so id order is insertion order.
        documents.sort_by_key(|d| d.id);
        Ok(documents)
    }

    fn update_document(&self, id: DocumentId, patch: DocumentPatch) -> StoreResult<Document> {
        let mut inner = self.inner.lock().unwrap();
        let document = inner
            .documents
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                collection: "document",
                id,
            })?;

        if let Some(status) = patch.status {
            document.status = status;
        }
        if let Some(source_path) = patch.source_path {
            document.source_path = Some(source_path);
        }
        if let Some(completed_at) = patch.completed_at {
            document.completed_at = Some(completed_at);
        }
        if let Some(error_message) = patch.error_message {
            document.error_message = Some(error_message);
        }
        if let Some(record_count) = patch.record_count {
            document.record_count = Some(record_count);
        }
        if let Some(artifact_ref) = patch.artifact_ref {
            document.artifact_ref = Some(artifact_ref);
        }

        Ok(document.clone())
    }

    fn delete_document(&self, id: DocumentId) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.documents.remove(&id).is_some();
        inner.steps.retain(|_, step| step.document_id != id);
        Ok(existed)
    }

    fn create_step(&self, new: NewStep) -> StoreResult<ProcessingStep> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_step_id;
        inner.next_step_id += 1;

        let step = ProcessingStep {
            id,
            document_id: new.document_id,
            step_name: new.step_name,
            status: new.status,
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        inner.steps.insert(id, step.clone());
        Ok(step)
    }

    fn steps_for_document(&self, document_id: DocumentId) -> StoreResult<Vec<ProcessingStep>> {
        let inner = self.inner.lock().unwrap();
        let mut steps: Vec<ProcessingStep> = inner
            .steps
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_name.position());
        Ok(steps)
    }

    fn update_step(&self, id: StepId, patch: StepPatch) -> StoreResult<ProcessingStep> {
        let mut inner = self.inner.lock().unwrap();
        let step = inner.steps.get_mut(&id).ok_or(StoreError::NotFound {
            collection: "step",
            id,
        })?;

        if let Some(status) = patch.status {
            step.status = status;
        }
        if let Some(started_at) = patch.started_at {
            step.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            step.completed_at = Some(completed_at);
        }
        if let Some(error_message) = patch.error_message {
            step.error_message = Some(error_message);
        }

        Ok(step.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{DocumentStatus, StepName, StepStatus};

    fn new_document(owner_id: i64) -> NewDocument {
        NewDocument {
            owner_id,
            filename: "report.pdf".to_string(),
            original_size: 1024,
            status: DocumentStatus::Processing,
            source_path: None,
        }
    }

    #[test]
    fn create_assigns_monotonic_ids_and_upload_time() {
        let store = MemoryStore::new();
        let first = store.create_document(new_document(1)).unwrap();
        let second = store.create_document(new_document(1)).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(first.completed_at.is_none());
        assert!(first.uploaded_at <= second.uploaded_at);
    }

    #[test]
    fn list_is_scoped_by_owner_in_insertion_order() {
        let store = MemoryStore::new();
        store.create_document(new_document(1)).unwrap();
        store.create_document(new_document(2)).unwrap();
        store.create_document(new_document(1)).unwrap();

        let documents = store.list_documents(1).unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents[0].id < documents[1].id);
    }

    #[test]
    fn update_merges_only_present_fields() {
        let store = MemoryStore::new();
        let document = store.create_document(new_document(1)).unwrap();

        let updated = store
            .update_document(
                document.id,
                DocumentPatch {
                    status: Some(DocumentStatus::Error),
                    error_message: Some("boom".to_string()),
                    completed_at: Some(Utc::now()),
                    ..DocumentPatch::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, DocumentStatus::Error);
        assert_eq!(updated.error_message.as_deref(), Some("boom"));
        // Untouched fields survive the merge.
        assert_eq!(updated.filename, "report.pdf");
        assert!(updated.record_count.is_none());
    }

    #[test]
    fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_document(42, DocumentPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 42, .. }));
    }

    #[test]
    fn delete_is_idempotent_and_removes_steps() {
        let store = MemoryStore::new();
        let document = store.create_document(new_document(1)).unwrap();
        store
            .create_step(NewStep {
                document_id: document.id,
                step_name: StepName::TextExtract,
                status: StepStatus::Pending,
            })
            .unwrap();

        assert!(store.delete_document(document.id).unwrap());
        assert!(!store.delete_document(document.id).unwrap());
        assert!(store.steps_for_document(document.id).unwrap().is_empty());
    }

    #[test]
    fn steps_come_back_in_stage_order() {
        let store = MemoryStore::new();
        let document = store.create_document(new_document(1)).unwrap();
        for step_name in [
            StepName::Serialize,
            StepName::Upload,
            StepName::SemanticExtract,
        ] {
            store
                .create_step(NewStep {
                    document_id: document.id,
                    step_name,
                    status: StepStatus::Pending,
                })
                .unwrap();
        }

        let steps = store.steps_for_document(document.id).unwrap();
        let names: Vec<StepName> = steps.iter().map(|s| s.step_name).collect();
        assert_eq!(
            names,
            vec![
                StepName::Upload,
                StepName::SemanticExtract,
                StepName::Serialize
            ]
        );
    }
}
