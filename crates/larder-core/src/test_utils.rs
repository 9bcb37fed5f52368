//! Test utilities for larder-core
//!
//! Provides a mock Ollama server for development and integration tests, so
//! the real `OllamaBackend` HTTP path can be exercised without a model
//! running.

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
///
/// Echoes back a small receipt. If the prompt contains a merchant hint
/// line, the hinted merchant is reflected so tests can assert plumbing.
async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let merchant = extract_hint(&request.prompt).unwrap_or_else(|| "MOCK MART".to_string());

    let response = format!(
        r#"{{"merchant": "{}", "date": "2025-01-15", "subtotal": 7.99, "tax": 0.56, "total": 8.55, "items": [{{"item_name": "MILK 2% GAL", "price": 3.99, "quantity": 1, "category": "dairy"}}, {{"item_name": "WHEAT BREAD", "price": 4.00, "quantity": 1, "category": "bakery"}}]}}"#,
        merchant
    );

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
}

/// Pull the merchant hint out of the rendered prompt
fn extract_hint(prompt: &str) -> Option<String> {
    let marker = "The merchant is likely: ";
    let start = prompt.find(marker)?;
    let after = &prompt[start + marker.len()..];
    let end = after.find('\n').unwrap_or(after.len());
    let hint = after[..end].trim();
    if hint.is_empty() {
        None
    } else {
        Some(hint.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    #[serde(default)]
    stream: bool,
    #[allow(dead_code)]
    #[serde(default)]
    format: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LlmBackend, OllamaBackend};

    #[tokio::test]
    async fn test_mock_server_round_trip() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2", 8192);

        assert!(backend.health_check().await);

        let receipt = backend
            .parse_receipt("MILK 2% GAL 3.99\nTOTAL 8.55", Some("WALMART"))
            .await
            .unwrap();
        assert_eq!(receipt.merchant.as_deref(), Some("WALMART"));
        assert_eq!(receipt.total, Some(855));
        assert_eq!(receipt.items.len(), 2);
    }
}
