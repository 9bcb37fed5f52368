//! Receipt parsing pipeline
//!
//! Orchestrates the full parse path: cache lookup, heuristic extraction,
//! routing, breaker-guarded LLM escalation, merging, caching, and alias
//! resolution. Every external failure degrades to the heuristic result;
//! the pipeline returns an error only when the input itself is unusable.

use std::time::Instant;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::ai::{LlmBackend, LlmClient};
use crate::breaker::{BreakerStatus, CircuitBreaker};
use crate::cache::{CacheStats, ResultCache};
use crate::config::PipelineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extract::HeuristicExtractor;
use crate::merge::merge_results;
use crate::models::{
    ItemResolution, ParseOutcome, ParseRequest, ParseSource, ParsedReceipt,
    ReconciliationSummary, RuleSource,
};
use crate::routing::{discrepancy_ratio, should_escalate};

/// Rough local-model cost estimate, for relative accounting across
/// heuristic-only and escalated parses
const MICROUSD_PER_1K_PROMPT_BYTES: u64 = 15;

/// The parsing pipeline with its injected collaborators
///
/// All services are explicit constructor arguments. Cloning is cheap for
/// the database (pooled); the cache and breaker are owned here, so share
/// the pipeline itself (e.g. in an Arc) rather than constructing twice.
pub struct ReceiptPipeline {
    config: PipelineConfig,
    extractor: HeuristicExtractor,
    cache: ResultCache,
    breaker: CircuitBreaker,
    llm: Option<LlmClient>,
    db: Database,
    phone_re: Regex,
    email_re: Regex,
}

impl ReceiptPipeline {
    pub fn new(config: PipelineConfig, db: Database, llm: Option<LlmClient>) -> Self {
        let extractor = HeuristicExtractor::new(config.extractor.clone());
        let cache = ResultCache::new(config.cache.clone());
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self {
            config,
            extractor,
            cache,
            breaker,
            llm,
            db,
            phone_re: Regex::new(r"\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}").expect("valid regex"),
            email_re: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("valid regex"),
        }
    }

    /// Parse one receipt end to end
    pub async fn parse(&self, request: &ParseRequest) -> Result<ParseOutcome> {
        let started = Instant::now();

        // Unusable input still yields a result: empty, zero-confidence,
        // unreconciled. Nothing to cache or escalate.
        if request.ocr_text.trim().is_empty() {
            debug!("empty OCR text, returning degraded result");
            let receipt = self.extractor.parse(&request.ocr_text, None);
            return Ok(self.outcome(receipt, ParseSource::Heuristics, started, 0, request));
        }

        // Strong key prefers the original image bytes when the caller
        // has them; a byte-identical re-submission hits here
        let content = request
            .image_bytes
            .as_deref()
            .unwrap_or(request.ocr_text.as_bytes());
        let line_count = request.ocr_text.lines().count();

        if let Some(cached) = self.cache.get_strong(content) {
            debug!("strong cache hit");
            return Ok(self.outcome(cached, ParseSource::Cache, started, 0, request));
        }

        let heuristic = self
            .extractor
            .parse(&request.ocr_text, request.store_hint.as_deref());

        // Re-scan of the same physical receipt with different OCR bytes
        if !request.force_llm {
            if let Some(cached) = self.cache.get_weak(
                heuristic.merchant.as_deref(),
                heuristic.date.as_deref(),
                heuristic.total_cents,
                line_count,
            ) {
                debug!("weak cache hit");
                return Ok(self.outcome(cached, ParseSource::Cache, started, 0, request));
            }
        }

        let escalate = request.force_llm || should_escalate(&heuristic, &self.config.routing);
        debug!(
            confidence = heuristic.confidence,
            reconciled = heuristic.reconciliation_ok,
            escalate,
            "routing decision"
        );

        let (receipt, cost) = if escalate {
            self.escalate(&heuristic, request).await
        } else {
            (heuristic, 0)
        };

        self.cache.put(content, line_count, &receipt);

        let source = receipt.source;
        Ok(self.outcome(receipt, source, started, cost, request))
    }

    /// LLM escalation behind the circuit breaker
    ///
    /// Any failure (breaker open, timeout, transport, bad JSON) falls back
    /// to the heuristic receipt; escalation can improve a parse but never
    /// lose one.
    async fn escalate(
        &self,
        heuristic: &ParsedReceipt,
        request: &ParseRequest,
    ) -> (ParsedReceipt, u64) {
        let Some(ref llm) = self.llm else {
            warn!("escalation wanted but no LLM backend configured");
            return (heuristic.clone(), 0);
        };

        let redacted_text = self.redact_pii(&request.ocr_text);
        let hint = request
            .store_hint
            .as_deref()
            .or(heuristic.merchant.as_deref());

        let cost = (redacted_text.len() as u64 / 1000 + 1) * MICROUSD_PER_1K_PROMPT_BYTES;

        match self
            .breaker
            .call(llm.parse_receipt(&redacted_text, hint))
            .await
        {
            Ok(llm_receipt) => {
                info!(model = llm.model(), "LLM escalation succeeded");
                let merged = merge_results(
                    heuristic,
                    &llm_receipt,
                    &self.config.extractor,
                    &self.config.llm,
                );
                (merged, cost)
            }
            Err(Error::CircuitOpen) => {
                warn!("LLM circuit open, using heuristic result");
                (heuristic.clone(), 0)
            }
            Err(e) => {
                warn!(error = %e, "LLM escalation failed, using heuristic result");
                (heuristic.clone(), cost)
            }
        }
    }

    fn outcome(
        &self,
        receipt: ParsedReceipt,
        source: ParseSource,
        started: Instant,
        cost: u64,
        request: &ParseRequest,
    ) -> ParseOutcome {
        let reconciliation = ReconciliationSummary {
            ok: receipt.reconciliation_ok,
            item_sum_cents: receipt.item_sum_cents(),
            subtotal_cents: receipt.subtotal_cents,
            total_cents: receipt.total_cents,
            discrepancy_ratio: discrepancy_ratio(&receipt),
        };

        let item_resolutions = self.resolve_items(&receipt, request);
        let redacted_pii = self.detect_pii(&request.ocr_text);

        ParseOutcome {
            receipt,
            source,
            processing_time_ms: started.elapsed().as_millis() as u64,
            llm_cost_estimate_microusd: cost,
            reconciliation,
            item_resolutions,
            redacted_pii,
        }
    }

    /// Resolve every item against the alias store
    ///
    /// Resolution failures are logged and yield an unresolved entry; a
    /// database hiccup must not fail a parse that already succeeded.
    fn resolve_items(&self, receipt: &ParsedReceipt, request: &ParseRequest) -> Vec<ItemResolution> {
        receipt
            .items
            .iter()
            .map(|item| {
                let resolved = self
                    .db
                    .resolve_alias(
                        &item.item_name,
                        receipt.merchant.as_deref(),
                        request.household_id,
                    )
                    .unwrap_or_else(|e| {
                        warn!(error = %e, item = %item.item_name, "alias resolution failed");
                        None
                    });
                ItemResolution {
                    item_name: item.item_name.clone(),
                    resolved,
                }
            })
            .collect()
    }

    /// Apply a user correction: the item maps to `ingredient_class`
    ///
    /// Records a miss on the rule that produced the wrong answer (if any)
    /// and learns a user rule for the right one.
    pub fn correct_item(
        &self,
        raw_text: &str,
        ingredient_class: &str,
        merchant: Option<&str>,
        household_id: Option<i64>,
        wrong_rule_id: Option<i64>,
    ) -> Result<i64> {
        if let Some(rule_id) = wrong_rule_id {
            self.db.record_alias_miss(rule_id)?;
        }
        self.db.learn_alias(
            raw_text,
            ingredient_class,
            merchant,
            household_id,
            RuleSource::User,
            &self.config.alias,
        )
    }

    /// Run the alias maintenance cycle
    pub fn run_maintenance(&self) -> Result<crate::db::MaintenanceReport> {
        self.db.run_alias_maintenance(&self.config.alias)
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    pub fn reset_breaker(&self) {
        self.breaker.reset()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Strip phone numbers and email addresses before the text leaves the
    /// process
    fn redact_pii(&self, text: &str) -> String {
        let text = self.phone_re.replace_all(text, "[REDACTED]");
        self.email_re.replace_all(&text, "[REDACTED]").into_owned()
    }

    fn detect_pii(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        if self.phone_re.is_match(text) {
            found.push("phone".to_string());
        }
        if self.email_re.is_match(text) {
            found.push("email".to_string());
        }
        found
    }
}
