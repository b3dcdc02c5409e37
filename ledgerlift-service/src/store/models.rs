//! Record structs and status vocabularies for the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DocumentId = i64;
pub type StepId = i64;

/// Lifecycle status for documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Upload in progress (set by the boundary before bytes have landed)
    Uploading,
    /// Queued or running through the extraction pipeline
    Processing,
    /// Pipeline finished; record count and artifact are set
    Completed,
    /// Pipeline failed; error message is set
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "uploading" => DocumentStatus::Uploading,
            "completed" => DocumentStatus::Completed,
            "error" => DocumentStatus::Error,
            _ => DocumentStatus::Processing,
        }
    }

    /// Terminal statuses are never left again except by deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error)
    }
}

/// Per-stage status for processing steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => StepStatus::Processing,
            "completed" => StepStatus::Completed,
            "error" => StepStatus::Error,
            _ => StepStatus::Pending,
        }
    }
}

/// The fixed, ordered pipeline stage vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Upload,
    TextExtract,
    OpticalFallback,
    SemanticExtract,
    Serialize,
}

impl StepName {
    /// Stage execution order. `optical_fallback` is conditional and may
    /// stay pending forever; all other stages run in this order.
    pub const SEQUENCE: [StepName; 5] = [
        StepName::Upload,
        StepName::TextExtract,
        StepName::OpticalFallback,
        StepName::SemanticExtract,
        StepName::Serialize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Upload => "upload",
            StepName::TextExtract => "text_extract",
            StepName::OpticalFallback => "optical_fallback",
            StepName::SemanticExtract => "semantic_extract",
            StepName::Serialize => "serialize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(StepName::Upload),
            "text_extract" => Some(StepName::TextExtract),
            "optical_fallback" => Some(StepName::OpticalFallback),
            "semantic_extract" => Some(StepName::SemanticExtract),
            "serialize" => Some(StepName::Serialize),
            _ => None,
        }
    }

    /// Position within the fixed stage order.
    pub fn position(&self) -> usize {
        Self::SEQUENCE.iter().position(|n| n == self).unwrap_or(0)
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: i64,
    pub filename: String,
    pub original_size: i64,
    pub status: DocumentStatus,
    /// Location of the uploaded bytes while they are retained. The file
    /// is removed once the pipeline reaches a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    /// Opaque handle to the CSV export, set only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
}

/// Fields supplied when creating a document; the store assigns the id
/// and the upload timestamp.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: i64,
    pub filename: String,
    pub original_size: i64,
    pub status: DocumentStatus,
    pub source_path: Option<String>,
}

/// Partial document update. Only fields set to `Some` are written; the
/// store merges them without recomputing invariants.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub status: Option<DocumentStatus>,
    pub source_path: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub record_count: Option<i64>,
    pub artifact_ref: Option<String>,
}

/// Processing step record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub id: StepId,
    pub document_id: DocumentId,
    pub step_name: StepName,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Fields supplied when creating a step record.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub document_id: DocumentId,
    pub step_name: StepName,
    pub status: StepStatus,
}

/// Partial step update, same merge semantics as [`DocumentPatch`].
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub status: Option<StepStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
