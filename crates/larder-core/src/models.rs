//! Domain models for Larder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a parsed receipt came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    /// Heuristic extractor only
    Heuristics,
    /// LLM adapter only
    Llm,
    /// Heuristic result with LLM gap-filling
    HeuristicsLlm,
    /// Served from the result cache
    Cache,
}

impl ParseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristics => "heuristics",
            Self::Llm => "llm",
            Self::HeuristicsLlm => "heuristics+llm",
            Self::Cache => "cache",
        }
    }
}

impl std::str::FromStr for ParseSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heuristics" => Ok(Self::Heuristics),
            "llm" => Ok(Self::Llm),
            "heuristics+llm" | "heuristics_llm" => Ok(Self::HeuristicsLlm),
            "cache" => Ok(Self::Cache),
            _ => Err(format!("Unknown parse source: {}", s)),
        }
    }
}

impl std::fmt::Display for ParseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single line item extracted from a receipt
///
/// Prices are always integer cents. Fractional currency never touches
/// floating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLineItem {
    /// Verbatim source line(s) this item came from
    pub raw_text: String,
    /// Cleaned item name
    pub item_name: String,
    /// Quantity, >= 0, defaults to 1
    pub quantity: f64,
    /// Unit of measure (EA, LB, KG, OZ, GAL, ...)
    pub unit: String,
    /// Price in integer cents
    pub price_cents: i64,
    /// Category keyword match, if any
    pub category: Option<String>,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
}

impl ParsedLineItem {
    pub fn new(raw_text: &str, item_name: &str, price_cents: i64) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            item_name: item_name.to_string(),
            quantity: 1.0,
            unit: "EA".to_string(),
            price_cents,
            category: None,
            confidence: 0.5,
        }
    }
}

/// Structured result of a receipt parse attempt
///
/// Constructed once per parse attempt and treated as immutable once handed
/// to the cache. A re-parse always builds a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub merchant: Option<String>,
    /// Store number extracted from labeled-number patterns
    pub store_id: Option<String>,
    /// ISO-8601 date (YYYY-MM-DD)
    pub date: Option<String>,
    /// ISO-8601 time (HH:MM[:SS])
    pub time: Option<String>,
    pub total_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub savings_cents: i64,
    pub items: Vec<ParsedLineItem>,
    /// Overall extraction confidence in [0, 1]
    pub confidence: f64,
    /// Whether item sums reconcile against posted totals
    pub reconciliation_ok: bool,
    /// Fraction of content lines that paired into items, in [0, 1]
    pub lines_paired_ratio: f64,
    /// SHA-256 of the raw OCR text
    pub content_hash: String,
    pub source: ParseSource,
}

impl Default for ParsedReceipt {
    fn default() -> Self {
        Self {
            merchant: None,
            store_id: None,
            date: None,
            time: None,
            total_cents: 0,
            subtotal_cents: 0,
            tax_cents: 0,
            savings_cents: 0,
            items: Vec::new(),
            confidence: 0.0,
            reconciliation_ok: false,
            lines_paired_ratio: 0.0,
            content_hash: String::new(),
            source: ParseSource::Heuristics,
        }
    }
}

impl ParsedReceipt {
    /// Number of items that carry a price
    pub fn priced_item_count(&self) -> usize {
        self.items.iter().filter(|i| i.price_cents > 0).count()
    }

    /// Sum of item prices in cents
    pub fn item_sum_cents(&self) -> i64 {
        self.items.iter().map(|i| i.price_cents).sum()
    }
}

/// Pattern matching type for alias rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Exact normalized-text match
    Exact,
    /// Dominant-token match
    Token,
    /// Regular expression match
    Regex,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Token => "token",
            Self::Regex => "regex",
        }
    }
}

impl std::str::FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "token" => Ok(Self::Token),
            "regex" => Ok(Self::Regex),
            _ => Err(format!("Unknown pattern type: {}", s)),
        }
    }
}

/// Where an alias rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    /// Created from a user correction; never auto-deleted
    User,
    /// Created by taxonomy import or heuristics
    System,
    /// Created from an LLM-provided category hint
    Llm,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Llm => "llm",
        }
    }
}

impl std::str::FromStr for RuleSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "llm" => Ok(Self::Llm),
            _ => Err(format!("Unknown rule source: {}", s)),
        }
    }
}

/// A learned mapping from raw item text to a canonical ingredient class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRule {
    pub id: i64,
    pub pattern: String,
    pub pattern_type: PatternType,
    /// Canonical ingredient class this rule resolves to
    pub ingredient_class: String,
    /// Narrower scope wins at resolution time
    pub merchant: Option<String>,
    pub household_id: Option<i64>,
    /// Bounded to [floor, ceiling] from config
    pub confidence: f64,
    pub hit_count: i64,
    pub miss_count: i64,
    pub source: RuleSource,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of resolving raw item text against the alias store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAlias {
    pub ingredient_class: String,
    pub confidence: f64,
    pub pattern_type: PatternType,
    /// The rule that matched, for miss feedback
    pub rule_id: i64,
}

/// Input to the pipeline
#[derive(Debug, Clone, Default)]
pub struct ParseRequest {
    /// Raw OCR text, UTF-8
    pub ocr_text: String,
    /// Optional store name hint
    pub store_hint: Option<String>,
    /// Skip routing and always invoke the LLM
    pub force_llm: bool,
    /// Raw image bytes, used for strong-key hashing when present
    pub image_bytes: Option<Vec<u8>>,
    /// Household scope for alias resolution
    pub household_id: Option<i64>,
}

/// Reconciliation details surfaced alongside the parse result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub ok: bool,
    pub item_sum_cents: i64,
    pub subtotal_cents: i64,
    pub total_cents: i64,
    /// Absolute item-sum/total discrepancy as a fraction of the total
    pub discrepancy_ratio: f64,
}

/// Per-item alias resolution surfaced in the outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResolution {
    pub item_name: String,
    pub resolved: Option<ResolvedAlias>,
}

/// Pipeline output: the receipt plus processing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub receipt: ParsedReceipt,
    pub source: ParseSource,
    pub processing_time_ms: u64,
    /// Estimated LLM cost in micro-dollars; 0 when the LLM was not invoked
    pub llm_cost_estimate_microusd: u64,
    pub reconciliation: ReconciliationSummary,
    pub item_resolutions: Vec<ItemResolution>,
    /// Detected-but-redacted PII categories, passed through opaquely
    pub redacted_pii: Vec<String>,
}
