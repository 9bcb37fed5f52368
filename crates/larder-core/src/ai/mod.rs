//! Pluggable local LLM backend abstraction
//!
//! All backends run locally (no cloud APIs). The pipeline talks to the
//! `LlmBackend` trait; `LlmClient` is the concrete enum wrapper providing
//! Clone and compile-time dispatch.
//!
//! Environment variables:
//! - `LLM_BACKEND`: Backend to use (ollama, mock, none). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL
//! - `OLLAMA_MODEL`: Model name (default: llama3.2)

mod mock;
mod ollama;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use types::{LlmItem, LlmReceipt};

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::Result;

/// Interface for all LLM backends
///
/// Backends are Send + Sync so a single client can be shared across tasks.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Parse raw OCR text into a structured receipt
    async fn parse_receipt(&self, ocr_text: &str, store_hint: Option<&str>) -> Result<LlmReceipt>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Model name (for logging)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete LLM client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum LlmClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl LlmClient {
    /// Create a client from environment variables
    ///
    /// Returns None when no backend is configured, which the pipeline
    /// treats as "heuristics only".
    pub fn from_env(config: &LlmConfig) -> Option<Self> {
        let backend = std::env::var("LLM_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => Some(LlmClient::Ollama(OllamaBackend::from_env(config))),
            "mock" => Some(LlmClient::Mock(MockBackend::new())),
            "none" | "off" => None,
            _ => {
                tracing::warn!(backend = %backend, "Unknown LLM_BACKEND, falling back to ollama");
                Some(LlmClient::Ollama(OllamaBackend::from_env(config)))
            }
        }
    }

    /// Create an Ollama backend from config
    pub fn ollama(config: &LlmConfig) -> Self {
        LlmClient::Ollama(OllamaBackend::from_config(config))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        LlmClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn parse_receipt(&self, ocr_text: &str, store_hint: Option<&str>) -> Result<LlmReceipt> {
        match self {
            LlmClient::Ollama(b) => b.parse_receipt(ocr_text, store_hint).await,
            LlmClient::Mock(b) => b.parse_receipt(ocr_text, store_hint).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            LlmClient::Ollama(b) => b.health_check().await,
            LlmClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            LlmClient::Ollama(b) => b.model(),
            LlmClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            LlmClient::Ollama(b) => b.host(),
            LlmClient::Mock(b) => b.host(),
        }
    }
}
