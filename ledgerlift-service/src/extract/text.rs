//! PDF text-layer extraction via PDFium.

use async_trait::async_trait;
use pdfium_render::prelude::*;
use tracing::debug;

use super::{ExtractedText, TextExtraction};
use crate::error::StageError;

/// Extracts the embedded text layer from PDF bytes. Scanned documents
/// typically produce little or no text here, which is what drives the
/// pipeline's optical fallback.
pub struct PdfiumTextExtractor;

#[async_trait]
impl TextExtraction for PdfiumTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, StageError> {
        let bytes = bytes.to_vec();
        // PDFium calls are blocking; keep them off the async runtime.
        tokio::task::spawn_blocking(move || extract_text_layer(&bytes))
            .await
            .map_err(|e| StageError::Failed {
                message: format!("text extraction task failed: {e}"),
            })?
    }
}

/// Locates libpdfium next to the binary, in vendor/pdfium/lib/, or on
/// the system library path.
fn create_pdfium() -> Result<Pdfium, StageError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| StageError::Failed {
            message: format!("failed to load PDFium library: {e:?}"),
        })?;

    Ok(Pdfium::new(bindings))
}

fn extract_text_layer(bytes: &[u8]) -> Result<ExtractedText, StageError> {
    let pdfium = create_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| StageError::Failed {
            message: format!("failed to load PDF: {e:?}"),
        })?;

    let page_count = document.pages().len() as usize;
    debug!(pages = page_count, "Extracting PDF text layer");

    let mut text = String::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_text = page.text().map_err(|e| StageError::Failed {
            message: format!(
                "failed to extract text from page {}: {e:?}",
                page_index + 1
            ),
        })?;

        let page_text = page_text.all();
        let page_text = page_text.trim();
        if !page_text.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(page_text);
        }
    }

    Ok(ExtractedText { text, page_count })
}
