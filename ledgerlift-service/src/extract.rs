//! Stage adapter boundary: the three extraction capabilities the
//! pipeline invokes, and the categorized-record shape they produce.
//!
//! Each adapter is a pure capability from input bytes/text to a result
//! or a [`StageError`]; the pipeline decides what a failure means.

pub mod optical;
pub mod semantic;
pub mod text;

pub use optical::RemoteOcrClient;
pub use semantic::OllamaExtractor;
pub use text::PdfiumTextExtractor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Result of the text-layer extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Result of the optical recognition stage.
#[derive(Debug, Clone)]
pub struct RecognizedText {
    pub text: String,
}

/// Text-layer extraction from the uploaded bytes.
#[async_trait]
pub trait TextExtraction: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, StageError>;
}

/// Optical character recognition over the uploaded bytes, used as the
/// fallback when the text layer is missing or too sparse.
#[async_trait]
pub trait OpticalRecognition: Send + Sync {
    async fn recognize(&self, bytes: &[u8]) -> Result<RecognizedText, StageError>;
}

/// Semantic extraction: raw text to categorized financial records.
#[async_trait]
pub trait SemanticExtraction: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ExtractionOutcome, StageError>;
}

/// One extracted financial line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    /// Line-item label, e.g. "Property taxes" or "Public safety".
    pub label: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund: Option<String>,
}

/// A named record category and its ordered records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCategory {
    pub name: String,
    pub records: Vec<FinancialRecord>,
}

/// All categorized records for one document, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub categories: Vec<RecordCategory>,
}

impl RecordSet {
    /// Total record count across all categories.
    pub fn record_count(&self) -> usize {
        self.categories.iter().map(|c| c.records.len()).sum()
    }
}

/// Document-level context captured alongside the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub municipality: String,
    pub fiscal_year: String,
    pub report_type: String,
    pub extracted_at: DateTime<Utc>,
}

/// Full result of the semantic extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub records: RecordSet,
    pub metadata: ExtractionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_count_sums_across_categories() {
        let set = RecordSet {
            categories: vec![
                RecordCategory {
                    name: "Revenue".to_string(),
                    records: vec![
                        FinancialRecord {
                            label: "Property taxes".to_string(),
                            amount: 1_200_000.0,
                            description: String::new(),
                            fund: None,
                        };
                        12
                    ],
                },
                RecordCategory {
                    name: "Expenditure".to_string(),
                    records: vec![
                        FinancialRecord {
                            label: "Public safety".to_string(),
                            amount: 800_000.0,
                            description: String::new(),
                            fund: None,
                        };
                        8
                    ],
                },
            ],
        };

        assert_eq!(set.record_count(), 20);
    }
}
