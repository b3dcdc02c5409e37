//! The pipeline state machine.
//!
//! Drives one document from `processing` to a terminal status: text
//! extraction, conditional optical fallback, semantic extraction, and
//! serialization. Every step transition is written to the store (and
//! broadcast) before the next stage begins, so polling clients may
//! observe any prefix of the sequence but never a reordered one.
//!
//! Stage failures are absorbed into step/document state; only store
//! failures escape to the caller, which is the supervising worker.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ServiceError, ServiceResult, StoreError};
use crate::service::ExtractionService;
use crate::store::{
    Document, DocumentId, DocumentPatch, DocumentStatus, ProcessingStep, StepId, StepName,
    StepPatch, StepStatus,
};

const NO_TEXT_MESSAGE: &str = "no text could be extracted";

/// Successful run: what goes onto the document's terminal record.
struct Completion {
    record_count: i64,
    artifact_ref: String,
}

/// Why a run stopped before completing.
enum RunHalt {
    /// Cancelled externally (document deletion); no terminal write.
    Cancelled,
    /// Unrecoverable stage failure; the document is marked `error`.
    Failed(String),
    /// The store itself failed; propagated to the supervising worker.
    Store(StoreError),
}

impl From<StoreError> for RunHalt {
    fn from(e: StoreError) -> Self {
        RunHalt::Store(e)
    }
}

fn find_step(steps: &[ProcessingStep], name: StepName) -> Result<StepId, RunHalt> {
    steps
        .iter()
        .find(|s| s.step_name == name)
        .map(|s| s.id)
        .ok_or_else(|| {
            RunHalt::Failed(format!(
                "processing step record {} is missing",
                name.as_str()
            ))
        })
}

fn check_cancelled(document_id: DocumentId, token: &CancellationToken) -> Result<(), RunHalt> {
    if token.is_cancelled() {
        info!(doc_id = document_id, "Pipeline run cancelled");
        Err(RunHalt::Cancelled)
    } else {
        Ok(())
    }
}

impl ExtractionService {
    /// Run the extraction pipeline for one document.
    ///
    /// All outcomes are observed through the store; the returned error
    /// covers only store failures and contract violations. Invoking
    /// this on an already-terminal document is a no-op.
    pub(crate) async fn run_pipeline(&self, document_id: DocumentId) -> ServiceResult<()> {
        let document = self
            .store
            .get_document(document_id)?
            .ok_or(ServiceError::DocumentNotFound { document_id })?;

        if document.status.is_terminal() {
            warn!(
                doc_id = document_id,
                status = document.status.as_str(),
                "Document already terminal, skipping pipeline run"
            );
            return Ok(());
        }

        let cancel_token = self.register_run_token(document_id);
        let outcome = self.execute_stages(&document, &cancel_token).await;
        self.unregister_run_token(document_id);

        // The uploaded bytes are released on every terminal path. A
        // cancelled run is deletion-driven; the delete flow owns the
        // file cleanup there.
        if !matches!(outcome, Err(RunHalt::Cancelled)) {
            self.cleanup_source_file(&document);
        }

        match outcome {
            Ok(completion) => {
                self.store.update_document(
                    document_id,
                    DocumentPatch {
                        status: Some(DocumentStatus::Completed),
                        completed_at: Some(Utc::now()),
                        record_count: Some(completion.record_count),
                        artifact_ref: Some(completion.artifact_ref),
                        ..DocumentPatch::default()
                    },
                )?;
                self.progress.document(
                    document_id,
                    DocumentStatus::Completed,
                    None,
                    Some(completion.record_count),
                );
                info!(
                    doc_id = document_id,
                    records = completion.record_count,
                    "Document processing complete"
                );
                Ok(())
            }
            Err(RunHalt::Cancelled) => Ok(()),
            Err(RunHalt::Failed(message)) => {
                error!(doc_id = document_id, error = %message, "Document processing failed");
                self.store.update_document(
                    document_id,
                    DocumentPatch {
                        status: Some(DocumentStatus::Error),
                        completed_at: Some(Utc::now()),
                        error_message: Some(message.clone()),
                        ..DocumentPatch::default()
                    },
                )?;
                self.progress
                    .document(document_id, DocumentStatus::Error, Some(&message), None);
                Ok(())
            }
            Err(RunHalt::Store(e)) => Err(e.into()),
        }
    }

    async fn execute_stages(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<Completion, RunHalt> {
        let steps = self.store.steps_for_document(document.id)?;
        let text_step = find_step(&steps, StepName::TextExtract)?;
        let optical_step = find_step(&steps, StepName::OpticalFallback)?;
        let semantic_step = find_step(&steps, StepName::SemanticExtract)?;
        let serialize_step = find_step(&steps, StepName::Serialize)?;

        let Some(source_path) = document.source_path.as_deref() else {
            return Err(RunHalt::Failed(
                "uploaded file is no longer available".to_string(),
            ));
        };
        let bytes = tokio::fs::read(source_path)
            .await
            .map_err(|e| RunHalt::Failed(format!("failed to read uploaded file: {e}")))?;

        // Stage: text layer extraction
        check_cancelled(document.id, cancel)?;
        self.mark_step_processing(document.id, text_step, StepName::TextExtract)?;
        let (mut extracted_text, text_failed) = match self.text.extract(&bytes).await {
            Ok(extract) => {
                self.mark_step_completed(document.id, text_step, StepName::TextExtract)?;
                info!(
                    doc_id = document.id,
                    pages = extract.page_count,
                    chars = extract.text.len(),
                    "Text layer extracted"
                );
                (extract.text, false)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    doc_id = document.id,
                    error = %message,
                    "Text layer extraction failed, trying optical fallback"
                );
                self.mark_step_error(document.id, text_step, StepName::TextExtract, &message)?;
                (String::new(), true)
            }
        };

        // Fallback decision: extraction failure always goes optical;
        // text below the configured threshold does too. Otherwise the
        // optical_fallback step stays pending forever.
        let threshold = self.config.pipeline.fallback_min_chars;
        if text_failed || extracted_text.trim().chars().count() < threshold {
            check_cancelled(document.id, cancel)?;
            self.mark_step_processing(document.id, optical_step, StepName::OpticalFallback)?;
            match self.optical.recognize(&bytes).await {
                Ok(recognized) => {
                    self.mark_step_completed(
                        document.id,
                        optical_step,
                        StepName::OpticalFallback,
                    )?;
                    info!(
                        doc_id = document.id,
                        chars = recognized.text.len(),
                        "Optical fallback recognized text"
                    );
                    extracted_text = recognized.text;
                }
                Err(e) => {
                    self.mark_step_error(
                        document.id,
                        optical_step,
                        StepName::OpticalFallback,
                        &e.to_string(),
                    )?;
                    return Err(RunHalt::Failed(NO_TEXT_MESSAGE.to_string()));
                }
            }
        }

        if extracted_text.trim().is_empty() {
            return Err(RunHalt::Failed(NO_TEXT_MESSAGE.to_string()));
        }

        // Stage: semantic extraction
        check_cancelled(document.id, cancel)?;
        self.mark_step_processing(document.id, semantic_step, StepName::SemanticExtract)?;
        let outcome = match self.semantic.extract(&extracted_text).await {
            Ok(outcome) => {
                self.mark_step_completed(document.id, semantic_step, StepName::SemanticExtract)?;
                outcome
            }
            Err(e) => {
                let message = e.to_string();
                self.mark_step_error(
                    document.id,
                    semantic_step,
                    StepName::SemanticExtract,
                    &message,
                )?;
                return Err(RunHalt::Failed(message));
            }
        };

        // Stage: serialization
        check_cancelled(document.id, cancel)?;
        self.mark_step_processing(document.id, serialize_step, StepName::Serialize)?;
        let csv = match self.serializer.serialize(&outcome) {
            Ok(bytes) => bytes,
            Err(e) => {
                let message = e.to_string();
                self.mark_step_error(document.id, serialize_step, StepName::Serialize, &message)?;
                return Err(RunHalt::Failed(message));
            }
        };
        let artifact_ref = match self.write_artifact(&csv) {
            Ok(artifact_ref) => artifact_ref,
            Err(e) => {
                let message = format!("failed to store export: {e}");
                self.mark_step_error(document.id, serialize_step, StepName::Serialize, &message)?;
                return Err(RunHalt::Failed(message));
            }
        };
        self.mark_step_completed(document.id, serialize_step, StepName::Serialize)?;

        Ok(Completion {
            record_count: outcome.records.record_count() as i64,
            artifact_ref,
        })
    }

    fn mark_step_processing(
        &self,
        document_id: DocumentId,
        step_id: StepId,
        name: StepName,
    ) -> Result<(), StoreError> {
        self.store.update_step(
            step_id,
            StepPatch {
                status: Some(StepStatus::Processing),
                started_at: Some(Utc::now()),
                ..StepPatch::default()
            },
        )?;
        self.progress
            .step(document_id, name, StepStatus::Processing, None);
        Ok(())
    }

    fn mark_step_completed(
        &self,
        document_id: DocumentId,
        step_id: StepId,
        name: StepName,
    ) -> Result<(), StoreError> {
        self.store.update_step(
            step_id,
            StepPatch {
                status: Some(StepStatus::Completed),
                completed_at: Some(Utc::now()),
                ..StepPatch::default()
            },
        )?;
        self.progress
            .step(document_id, name, StepStatus::Completed, None);
        Ok(())
    }

    fn mark_step_error(
        &self,
        document_id: DocumentId,
        step_id: StepId,
        name: StepName,
        message: &str,
    ) -> Result<(), StoreError> {
        self.store.update_step(
            step_id,
            StepPatch {
                status: Some(StepStatus::Error),
                completed_at: Some(Utc::now()),
                error_message: Some(message.to_string()),
                ..StepPatch::default()
            },
        )?;
        self.progress
            .step(document_id, name, StepStatus::Error, Some(message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::config::{
        OcrConfig, PipelineConfig, SemanticConfig, ServerConfig, StaticConfig, StorageConfig,
    };
    use crate::error::StageError;
    use crate::extract::{
        ExtractedText, ExtractionMetadata, ExtractionOutcome, FinancialRecord, OpticalRecognition,
        RecognizedText, RecordCategory, RecordSet, SemanticExtraction, TextExtraction,
    };
    use crate::serialize::CsvSerializer;
    use crate::service::ExtractionService;
    use crate::store::{Document, DocumentStatus, MemoryStore, StepName, StepStatus};

    struct ScriptedText {
        result: Result<String, String>,
        delay: Duration,
    }

    impl ScriptedText {
        fn ok(text: &str) -> Self {
            Self {
                result: Ok(text.to_string()),
                delay: Duration::ZERO,
            }
        }

        fn err(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl TextExtraction for ScriptedText {
        async fn extract(&self, _bytes: &[u8]) -> Result<ExtractedText, StageError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.result {
                Ok(text) => Ok(ExtractedText {
                    text: text.clone(),
                    page_count: 1,
                }),
                Err(message) => Err(StageError::Failed {
                    message: message.clone(),
                }),
            }
        }
    }

    struct ScriptedOcr {
        result: Result<String, String>,
    }

    impl ScriptedOcr {
        fn ok(text: &str) -> Self {
            Self {
                result: Ok(text.to_string()),
            }
        }

        fn err(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl OpticalRecognition for ScriptedOcr {
        async fn recognize(&self, _bytes: &[u8]) -> Result<RecognizedText, StageError> {
            match &self.result {
                Ok(text) => Ok(RecognizedText { text: text.clone() }),
                Err(message) => Err(StageError::Failed {
                    message: message.clone(),
                }),
            }
        }
    }

    struct ScriptedSemantic {
        result: Result<ExtractionOutcome, String>,
    }

    impl ScriptedSemantic {
        fn ok(outcome: ExtractionOutcome) -> Self {
            Self {
                result: Ok(outcome),
            }
        }

        fn err(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl SemanticExtraction for ScriptedSemantic {
        async fn extract(&self, _text: &str) -> Result<ExtractionOutcome, StageError> {
            match &self.result {
                Ok(outcome) => Ok(outcome.clone()),
                Err(message) => Err(StageError::Failed {
                    message: message.clone(),
                }),
            }
        }
    }

    fn test_config(tmp: &TempDir) -> StaticConfig {
        StaticConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            storage: StorageConfig {
                data_dir: tmp.path().to_path_buf(),
            },
            pipeline: PipelineConfig::default(),
            ocr: OcrConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }

    fn records(revenues: usize, expenditures: usize) -> ExtractionOutcome {
        let record = |label: &str| FinancialRecord {
            label: label.to_string(),
            amount: 1000.0,
            description: String::new(),
            fund: None,
        };
        ExtractionOutcome {
            records: RecordSet {
                categories: vec![
                    RecordCategory {
                        name: "Revenue".to_string(),
                        records: (0..revenues).map(|_| record("Property taxes")).collect(),
                    },
                    RecordCategory {
                        name: "Expenditure".to_string(),
                        records: (0..expenditures).map(|_| record("Public safety")).collect(),
                    },
                ],
            },
            metadata: ExtractionMetadata {
                municipality: "Springfield".to_string(),
                fiscal_year: "2023".to_string(),
                report_type: "ACFR".to_string(),
                extracted_at: Utc::now(),
            },
        }
    }

    fn service_with(
        tmp: &TempDir,
        text: ScriptedText,
        ocr: ScriptedOcr,
        semantic: ScriptedSemantic,
    ) -> Arc<ExtractionService> {
        Arc::new(ExtractionService::new(
            test_config(tmp),
            Arc::new(MemoryStore::new()),
            Arc::new(text),
            Arc::new(ocr),
            Arc::new(semantic),
            Arc::new(CsvSerializer),
        ))
    }

    async fn uploaded_document(service: &ExtractionService) -> Document {
        service
            .create_document(b"%PDF-1.4 test bytes", "report.pdf", 1)
            .await
            .unwrap()
    }

    fn step_status(service: &ExtractionService, document_id: i64, name: StepName) -> StepStatus {
        service
            .store
            .steps_for_document(document_id)
            .unwrap()
            .into_iter()
            .find(|s| s.step_name == name)
            .unwrap()
            .status
    }

    fn long_text() -> String {
        "municipal ledger line ".repeat(300)
    }

    #[tokio::test]
    async fn sufficient_text_skips_the_optical_fallback() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::ok(records(2, 1)),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert!(document.completed_at.is_some());
        assert_eq!(document.record_count, Some(3));
        assert!(document.artifact_ref.is_some());

        let steps = service.store.steps_for_document(document.id).unwrap();
        let optical = steps
            .iter()
            .find(|s| s.step_name == StepName::OpticalFallback)
            .unwrap();
        assert_eq!(optical.status, StepStatus::Pending);
        assert!(optical.started_at.is_none());
        assert_eq!(
            step_status(&service, document.id, StepName::TextExtract),
            StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn empty_text_runs_the_optical_fallback() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(""),
            ScriptedOcr::ok(&long_text()),
            ScriptedSemantic::ok(records(1, 1)),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert_eq!(
            step_status(&service, document.id, StepName::OpticalFallback),
            StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn short_text_also_runs_the_optical_fallback() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok("just a header"),
            ScriptedOcr::ok(&long_text()),
            ScriptedSemantic::ok(records(1, 0)),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        assert_eq!(
            step_status(&service, document.id, StepName::OpticalFallback),
            StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn text_failure_falls_back_and_records_the_step_error() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::err("malformed xref table"),
            ScriptedOcr::ok(&long_text()),
            ScriptedSemantic::ok(records(1, 1)),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let steps = service.store.steps_for_document(document.id).unwrap();
        let text = steps
            .iter()
            .find(|s| s.step_name == StepName::TextExtract)
            .unwrap();
        assert_eq!(text.status, StepStatus::Error);
        assert_eq!(text.error_message.as_deref(), Some("malformed xref table"));

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn both_extraction_paths_empty_is_terminal() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(""),
            ScriptedOcr::ok(""),
            ScriptedSemantic::err("must not run"),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Error);
        assert_eq!(
            document.error_message.as_deref(),
            Some("no text could be extracted")
        );
        assert!(document.completed_at.is_some());

        // Skipped stages never advance past a failed prerequisite.
        assert_eq!(
            step_status(&service, document.id, StepName::SemanticExtract),
            StepStatus::Pending
        );
        assert_eq!(
            step_status(&service, document.id, StepName::Serialize),
            StepStatus::Pending
        );
    }

    #[tokio::test]
    async fn optical_failure_is_terminal() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::err("no text layer"),
            ScriptedOcr::err("ocr engine crashed"),
            ScriptedSemantic::err("must not run"),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Error);
        assert_eq!(
            document.error_message.as_deref(),
            Some("no text could be extracted")
        );
        assert_eq!(
            step_status(&service, document.id, StepName::OpticalFallback),
            StepStatus::Error
        );
    }

    #[tokio::test]
    async fn semantic_failure_carries_the_adapter_message() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::err("rate limited"),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let steps = service.store.steps_for_document(document.id).unwrap();
        let semantic = steps
            .iter()
            .find(|s| s.step_name == StepName::SemanticExtract)
            .unwrap();
        assert_eq!(semantic.status, StepStatus::Error);
        assert_eq!(semantic.error_message.as_deref(), Some("rate limited"));

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Error);
        assert_eq!(document.error_message.as_deref(), Some("rate limited"));
        assert_eq!(
            step_status(&service, document.id, StepName::Serialize),
            StepStatus::Pending
        );
    }

    #[tokio::test]
    async fn record_count_sums_all_categories() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::ok(records(12, 8)),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert_eq!(document.record_count, Some(20));

        // The artifact holds the header plus one row per record.
        let artifact_path = tmp
            .path()
            .join(document.artifact_ref.as_deref().unwrap());
        let csv = std::fs::read_to_string(artifact_path).unwrap();
        assert_eq!(csv.lines().count(), 21);
    }

    #[tokio::test]
    async fn completed_at_is_null_until_terminal() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::ok(records(1, 0)),
        );
        let document = uploaded_document(&service).await;
        assert!(document.completed_at.is_none());

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert!(document.status.is_terminal());
        assert!(document.completed_at.is_some());
    }

    #[tokio::test]
    async fn rerun_on_a_terminal_document_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::ok(records(2, 2)),
        );
        let document = uploaded_document(&service).await;

        service.run_pipeline(document.id).await.unwrap();
        let first = service.store.get_document(document.id).unwrap().unwrap();

        service.run_pipeline(document.id).await.unwrap();
        let second = service.store.get_document(document.id).unwrap().unwrap();

        assert_eq!(first.completed_at, second.completed_at);
        assert_eq!(first.record_count, second.record_count);
    }

    #[tokio::test]
    async fn upload_file_is_removed_on_success_and_failure() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::err("rate limited"),
        );
        let document = uploaded_document(&service).await;
        let source_path = document.source_path.clone().unwrap();
        assert!(std::path::Path::new(&source_path).exists());

        service.run_pipeline(document.id).await.unwrap();

        assert!(!std::path::Path::new(&source_path).exists());
    }

    #[tokio::test]
    async fn missing_upload_file_is_a_terminal_error() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText::ok(&long_text()),
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::ok(records(1, 0)),
        );
        let document = uploaded_document(&service).await;
        std::fs::remove_file(document.source_path.as_deref().unwrap()).unwrap();

        service.run_pipeline(document.id).await.unwrap();

        let document = service.store.get_document(document.id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Error);
        assert!(document.error_message.is_some());
        assert_eq!(
            step_status(&service, document.id, StepName::TextExtract),
            StepStatus::Pending
        );
    }

    #[tokio::test]
    async fn cancellation_stops_the_run_without_a_terminal_write() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(
            &tmp,
            ScriptedText {
                result: Ok(long_text()),
                delay: Duration::from_millis(200),
            },
            ScriptedOcr::err("must not run"),
            ScriptedSemantic::ok(records(1, 0)),
        );
        let document = uploaded_document(&service).await;

        let runner = service.clone();
        let document_id = document.id;
        let handle = tokio::spawn(async move { runner.run_pipeline(document_id).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(service.cancel_run(document_id));

        handle.await.unwrap().unwrap();

        let document = service.store.get_document(document_id).unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Processing);
        assert!(document.completed_at.is_none());
        assert_eq!(
            step_status(&service, document_id, StepName::SemanticExtract),
            StepStatus::Pending
        );
    }
}
