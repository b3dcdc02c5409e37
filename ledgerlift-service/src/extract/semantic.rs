//! Semantic extraction via an Ollama-compatible chat API.
//!
//! The model is asked for strict JSON describing categorized municipal
//! financial records; the response is validated and mapped into the
//! pipeline's record shape. Missing categories come back empty rather
//! than failing the stage.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    ExtractionMetadata, ExtractionOutcome, FinancialRecord, RecordCategory, RecordSet,
    SemanticExtraction,
};
use crate::config::SemanticConfig;
use crate::error::StageError;

const SYSTEM_PROMPT: &str = r#"You are a financial analyst specializing in municipal annual financial reports. Extract and structure financial data from the provided text:

1. Revenues: tax revenues, intergovernmental revenues, charges for services, fines, investment income
2. Expenditures: general government, public safety, public works, community development, debt service
3. Fund balances: general fund, special revenue funds, capital projects funds, debt service funds
4. Assets: current assets, capital assets, investments, restricted assets
5. Liabilities: current liabilities, long-term debt, pension obligations

Return JSON in exactly this structure:
{
  "revenues": [{"category": "string", "amount": number, "description": "string", "fund": "string"}],
  "expenditures": [{"category": "string", "amount": number, "description": "string", "fund": "string"}],
  "funds": [{"name": "string", "balance": number, "type": "string"}],
  "assets": [{"category": "string", "amount": number, "description": "string"}],
  "liabilities": [{"category": "string", "amount": number, "description": "string"}],
  "metadata": {"municipalityName": "string", "fiscalYear": "string", "reportType": "string"}
}

Extract actual dollar amounts (convert thousands/millions as needed). If no data is found for a category, return an empty array."#;

/// Semantic extractor backed by an Ollama-compatible `/api/chat`
/// endpoint with JSON-formatted output.
pub struct OllamaExtractor {
    client: Client,
    config: SemanticConfig,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: String,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    revenues: Vec<RawRecord>,
    #[serde(default)]
    expenditures: Vec<RawRecord>,
    #[serde(default)]
    funds: Vec<RawFund>,
    #[serde(default)]
    assets: Vec<RawRecord>,
    #[serde(default)]
    liabilities: Vec<RawRecord>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    category: String,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    fund: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFund {
    #[serde(default)]
    name: String,
    #[serde(default)]
    balance: f64,
    #[serde(default, rename = "type")]
    fund_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default, alias = "municipalityName")]
    municipality_name: Option<String>,
    #[serde(default, alias = "fiscalYear")]
    fiscal_year: Option<String>,
    #[serde(default, alias = "reportType")]
    report_type: Option<String>,
}

impl OllamaExtractor {
    pub fn new(config: SemanticConfig) -> Result<Self, StageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StageError::Unavailable {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self { client, config })
    }

    /// Check whether the model server is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Model server health check failed");
                false
            }
        }
    }

    fn truncate_to_budget<'a>(&self, text: &'a str) -> &'a str {
        let budget = self.config.prompt_budget_chars;
        match text.char_indices().nth(budget) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

#[async_trait]
impl SemanticExtraction for OllamaExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionOutcome, StageError> {
        let url = format!("{}/api/chat", self.config.base_url);

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Extract municipal financial data from this report text:\n\n{}",
                        self.truncate_to_budget(text)
                    ),
                },
            ],
            stream: false,
            format: "json".to_string(),
            // Low temperature for consistent extraction
            options: ChatOptions { temperature: 0.1 },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
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
                .unwrap_or_else(|_| "semantic extraction request failed".to_string());
            return Err(StageError::Engine { status, message });
        }

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| StageError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        let raw: RawExtraction = serde_json::from_str(&body.message.content)
            .map_err(|e| StageError::InvalidResponse { source: e })?;

        let outcome = into_outcome(raw);
        debug!(
            records = outcome.records.record_count(),
            municipality = %outcome.metadata.municipality,
            "Semantic extraction produced records"
        );

        Ok(outcome)
    }
}

fn into_records(raw: Vec<RawRecord>) -> Vec<FinancialRecord> {
    raw.into_iter()
        .map(|r| FinancialRecord {
            label: r.category,
            amount: r.amount,
            description: r.description,
            fund: r.fund.filter(|f| !f.is_empty()),
        })
        .collect()
}

fn into_outcome(raw: RawExtraction) -> ExtractionOutcome {
    let fund_records = raw
        .funds
        .into_iter()
        .map(|f| FinancialRecord {
            label: f.name,
            amount: f.balance,
            description: f.fund_type,
            fund: None,
        })
        .collect();

    let records = RecordSet {
        categories: vec![
            RecordCategory {
                name: "Revenue".to_string(),
                records: into_records(raw.revenues),
            },
            RecordCategory {
                name: "Expenditure".to_string(),
                records: into_records(raw.expenditures),
            },
            RecordCategory {
                name: "Fund Balance".to_string(),
                records: fund_records,
            },
            RecordCategory {
                name: "Asset".to_string(),
                records: into_records(raw.assets),
            },
            RecordCategory {
                name: "Liability".to_string(),
                records: into_records(raw.liabilities),
            },
        ],
    };

    ExtractionOutcome {
        records,
        metadata: ExtractionMetadata {
            municipality: raw
                .metadata
                .municipality_name
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            fiscal_year: raw
                .metadata
                .fiscal_year
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            report_type: raw
                .metadata
                .report_type
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "CAFR".to_string()),
            extracted_at: Utc::now(),
        },
    }
}
