//! Document and step record storage.
//!
//! The store owns both record collections. Two implementations sit
//! behind the same trait: an in-memory arena used as the reference
//! implementation (and by tests), and a SQLite-backed durable store.
//! The pipeline is the only writer of mutations after creation; every
//! other component is a read-only consumer.

mod memory;
pub mod models;
mod sqlite;

pub use memory::MemoryStore;
pub use models::{
    Document, DocumentId, DocumentPatch, DocumentStatus, NewDocument, NewStep, ProcessingStep,
    StepId, StepName, StepPatch, StepStatus,
};
pub use sqlite::SqliteStore;

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage contract shared by all backends.
///
/// Each record mutation is atomic with respect to other mutations on the
/// same record; no cross-record transactions are provided. `update_*`
/// merges only the fields present in the patch and fails with
/// [`StoreError::NotFound`] for absent ids. Deletes are idempotent.
pub trait DocumentStore: Send + Sync {
    fn create_document(&self, new: NewDocument) -> StoreResult<Document>;

    fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>>;

    /// Documents for one owner, in insertion order.
    fn list_documents(&self, owner_id: i64) -> StoreResult<Vec<Document>>;

    fn update_document(&self, id: DocumentId, patch: DocumentPatch) -> StoreResult<Document>;

    /// Removes the document and its step records. Returns `false` when
    /// the id was absent.
    fn delete_document(&self, id: DocumentId) -> StoreResult<bool>;

    fn create_step(&self, new: NewStep) -> StoreResult<ProcessingStep>;

    /// Steps for one document, ordered by stage position.
    fn steps_for_document(&self, document_id: DocumentId) -> StoreResult<Vec<ProcessingStep>>;

    fn update_step(&self, id: StepId, patch: StepPatch) -> StoreResult<ProcessingStep>;
}
