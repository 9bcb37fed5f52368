//! Larder Core Library
//!
//! Shared functionality for the Larder grocery receipt tool:
//! - OCR text normalization and store layout profiles
//! - Heuristic receipt extraction with arithmetic reconciliation
//! - Confidence-based routing to a local LLM, guarded by a circuit breaker
//! - Heuristic/LLM result merging
//! - Dual-key result caching
//! - Learned alias rules mapping raw item text to ingredient classes
//! - Prompt library for customizable LLM prompts

pub mod ai;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod routing;
pub mod stores;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{LlmBackend, LlmClient, LlmItem, LlmReceipt, MockBackend, OllamaBackend};
pub use breaker::{BreakerStatus, CircuitBreaker, CircuitState};
pub use cache::{CacheStats, ResultCache};
pub use config::{DecayStrategy, PipelineConfig};
pub use db::{AliasStats, Database, MaintenanceReport};
pub use error::{Error, Result};
pub use extract::HeuristicExtractor;
pub use models::{
    AliasRule, ItemResolution, ParseOutcome, ParseRequest, ParseSource, ParsedLineItem,
    ParsedReceipt, PatternType, ReconciliationSummary, ResolvedAlias, RuleSource,
};
pub use pipeline::ReceiptPipeline;
pub use prompts::{Prompt, PromptId, PromptLibrary};
