//! Optical recognition via a remote OCR HTTP service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{OpticalRecognition, RecognizedText};
use crate::config::OcrConfig;
use crate::error::StageError;

/// Client for an OCR service that accepts document bytes on
/// `POST /ocr` and answers with the recognized text as JSON.
pub struct RemoteOcrClient {
    client: Client,
    config: OcrConfig,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
    #[serde(default)]
    #[allow(dead_code)] // Reported by some OCR backends; useful when debugging
    confidence: Option<f64>,
}

impl RemoteOcrClient {
    pub fn new(config: OcrConfig) -> Result<Self, StageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StageError::Unavailable {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl OpticalRecognition for RemoteOcrClient {
    async fn recognize(&self, bytes: &[u8]) -> Result<RecognizedText, StageError> {
        let url = format!("{}/ocr", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StageError::Unavailable {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "OCR request failed".to_string());
            return Err(StageError::Engine { status, message });
        }

        let body: OcrResponse =
            response
                .json()
                .await
                .map_err(|e| StageError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        debug!(chars = body.text.len(), "OCR service returned text");

        Ok(RecognizedText {
            text: body.text.trim().to_string(),
        })
    }
}
