//! Mock backend for testing
//!
//! Returns a canned receipt (or a configured failure) without any network
//! traffic. Useful for unit tests and development without a running model
//! server.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{LlmItem, LlmReceipt};
use super::LlmBackend;

/// Mock LLM backend
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should report available
    pub healthy: bool,
    /// When set, parse_receipt returns this instead of the default
    canned: Option<LlmReceipt>,
    /// When true, parse_receipt always fails
    failing: bool,
}

impl MockBackend {
    /// Healthy mock returning a small default receipt
    pub fn new() -> Self {
        Self {
            healthy: true,
            canned: None,
            failing: false,
        }
    }

    /// Mock returning a specific receipt
    pub fn with_receipt(receipt: LlmReceipt) -> Self {
        Self {
            healthy: true,
            canned: Some(receipt),
            failing: false,
        }
    }

    /// Mock whose parse_receipt always errors
    pub fn failing() -> Self {
        Self {
            healthy: false,
            canned: None,
            failing: true,
        }
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn parse_receipt(
        &self,
        _ocr_text: &str,
        store_hint: Option<&str>,
    ) -> Result<LlmReceipt> {
        if self.failing {
            return Err(Error::InvalidData("mock backend configured to fail".into()));
        }
        if let Some(ref canned) = self.canned {
            return Ok(canned.clone());
        }
        Ok(LlmReceipt {
            merchant: store_hint.map(|s| s.to_string()).or(Some("MOCK MART".into())),
            date: Some("2025-01-15".to_string()),
            subtotal: Some(799),
            tax: Some(56),
            total: Some(855),
            items: vec![
                LlmItem {
                    item_name: "MILK 2% GAL".to_string(),
                    price: 399,
                    quantity: Some(1.0),
                    category: Some("dairy".to_string()),
                },
                LlmItem {
                    item_name: "WHEAT BREAD".to_string(),
                    price: 400,
                    quantity: Some(2.0),
                    category: Some("bakery".to_string()),
                },
            ],
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://local"
    }
}
