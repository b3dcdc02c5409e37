//! Service configuration loaded at startup from an optional `config` file
//! merged with `LEDGERLIFT__`-prefixed environment variables.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub semantic: SemanticConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the database, uploaded files, and CSV exports.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Pipeline behavior tunables
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent pipeline workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,

    /// Minimum extracted-text length (chars, after trimming) below which
    /// the optical fallback runs. Text-layer extraction failure triggers
    /// the fallback regardless of this threshold.
    #[serde(default = "default_fallback_min_chars")]
    pub fallback_min_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_document_size_bytes: default_max_document_size(),
            fallback_min_chars: default_fallback_min_chars(),
        }
    }
}

/// Remote OCR service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_url")]
    pub base_url: String,

    #[serde(default = "default_ocr_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: default_ocr_url(),
            request_timeout_secs: default_ocr_timeout(),
        }
    }
}

/// Semantic extraction (Ollama-compatible chat API) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "default_semantic_url")]
    pub base_url: String,

    #[serde(default = "default_semantic_model")]
    pub model: String,

    #[serde(default = "default_semantic_timeout")]
    pub request_timeout_secs: u64,

    /// Extracted text is truncated to this many characters before it is
    /// sent to the model, to stay within context limits.
    #[serde(default = "default_prompt_budget")]
    pub prompt_budget_chars: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            base_url: default_semantic_url(),
            model: default_semantic_model(),
            request_timeout_secs: default_semantic_timeout(),
            prompt_budget_chars: default_prompt_budget(),
        }
    }
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8450
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_worker_count() -> usize {
    2
}

fn default_max_document_size() -> u64 {
    50 * 1024 * 1024
}

fn default_fallback_min_chars() -> usize {
    1000
}

fn default_ocr_url() -> String {
    "http://127.0.0.1:8884".to_string()
}

fn default_ocr_timeout() -> u64 {
    120
}

fn default_semantic_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_semantic_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_semantic_timeout() -> u64 {
    300
}

fn default_prompt_budget() -> usize {
    15_000
}
