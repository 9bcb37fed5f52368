//! Pipeline configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/larder/config/larder.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Override files are partial: any key left out keeps its default, so a
//! one-line file tuning a single threshold is valid.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/larder.toml");

/// Heuristic extractor tuning
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Absolute cents floor of the reconciliation tolerance band
    pub tolerance_floor_cents: i64,
    /// Percentage component of the reconciliation tolerance band
    pub tolerance_percent: f64,
    /// Items at or above this confidence survive merging untouched
    pub item_keep_threshold: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tolerance_floor_cents: 50,
            tolerance_percent: 0.05,
            item_keep_threshold: 0.7,
        }
    }
}

/// Routing decision thresholds
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub confidence_accept: f64,
    pub confidence_floor: f64,
    pub min_priced_items: usize,
    pub discrepancy_escalate: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_accept: 0.75,
            confidence_floor: 0.5,
            min_priced_items: 3,
            discrepancy_escalate: 0.10,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Bounded sliding window of recent call outcomes
    pub window_size: usize,
    /// Minimum observed calls before the failure ratio can trip the breaker
    pub min_calls: usize,
    /// Windowed failure ratio that opens the circuit
    pub failure_threshold: f64,
    /// How long the circuit stays open before allowing a probe
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes required to close
    pub half_open_successes: u32,
    /// Per-call timeout; a timeout counts as a failure
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_calls: 5,
            failure_threshold: 0.5,
            recovery_timeout: Duration::from_secs(30),
            half_open_successes: 3,
            call_timeout: Duration::from_secs(2),
        }
    }
}

/// LLM adapter settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub max_prompt_bytes: usize,
    pub max_merged_items: usize,
    pub merge_confidence_boost: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            max_prompt_bytes: 8192,
            max_merged_items: 50,
            merge_confidence_boost: 0.1,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub strong_ttl: Duration,
    pub weak_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            strong_ttl: Duration::from_secs(30 * 24 * 3600),
            weak_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Decay strategy for alias rule confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayStrategy {
    /// Fixed subtraction per cycle
    Linear,
    /// Multiplicative, compounding with inactivity
    Exponential,
    /// Multiplicative, scaled by the observed miss/hit ratio
    Adaptive,
}

impl std::str::FromStr for DecayStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(format!("Unknown decay strategy: {}", s)),
        }
    }
}

/// Alias learner settings
#[derive(Debug, Clone)]
pub struct AliasConfig {
    pub confidence_floor: f64,
    pub confidence_ceiling: f64,
    pub user_initial_confidence: f64,
    pub system_initial_confidence: f64,
    pub inactivity_days: i64,
    pub decay_strategy: DecayStrategy,
    pub decay_factor: f64,
    pub boost_min_uses: i64,
    pub boost_factor: f64,
    pub prune_confidence: f64,
    pub prune_min_age_days: i64,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.1,
            confidence_ceiling: 0.98,
            user_initial_confidence: 0.8,
            system_initial_confidence: 0.6,
            inactivity_days: 7,
            decay_strategy: DecayStrategy::Adaptive,
            decay_factor: 0.9,
            boost_min_uses: 5,
            boost_factor: 1.1,
            prune_confidence: 0.25,
            prune_min_age_days: 14,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub extractor: ExtractorConfig,
    pub routing: RoutingConfig,
    pub breaker: BreakerConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub alias: AliasConfig,
}

impl PipelineConfig {
    /// Load configuration (data-dir override first, then embedded default)
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load with a custom override path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        load_config(Some(path))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("larder").join("config").join("larder.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let content = if let Some(path) = override_path {
        if path.exists() {
            fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        } else {
            DEFAULT_CONFIG.to_string()
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            fs::read_to_string(&default_path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        } else {
            DEFAULT_CONFIG.to_string()
        }
    } else {
        DEFAULT_CONFIG.to_string()
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    extractor: Option<RawExtractor>,
    routing: Option<RawRouting>,
    breaker: Option<RawBreaker>,
    llm: Option<RawLlm>,
    cache: Option<RawCache>,
    alias: Option<RawAlias>,
}

#[derive(Debug, Deserialize)]
struct RawExtractor {
    tolerance_floor_cents: Option<i64>,
    tolerance_percent: Option<f64>,
    item_keep_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawRouting {
    confidence_accept: Option<f64>,
    confidence_floor: Option<f64>,
    min_priced_items: Option<usize>,
    discrepancy_escalate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawBreaker {
    window_size: Option<usize>,
    min_calls: Option<usize>,
    failure_threshold: Option<f64>,
    recovery_timeout_secs: Option<u64>,
    half_open_successes: Option<u32>,
    call_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawLlm {
    host: Option<String>,
    model: Option<String>,
    max_prompt_bytes: Option<usize>,
    max_merged_items: Option<usize>,
    merge_confidence_boost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCache {
    max_entries: Option<usize>,
    strong_ttl_days: Option<u64>,
    weak_ttl_days: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawAlias {
    confidence_floor: Option<f64>,
    confidence_ceiling: Option<f64>,
    user_initial_confidence: Option<f64>,
    system_initial_confidence: Option<f64>,
    inactivity_days: Option<i64>,
    decay_strategy: Option<String>,
    decay_factor: Option<f64>,
    boost_min_uses: Option<i64>,
    boost_factor: Option<f64>,
    prune_confidence: Option<f64>,
    prune_min_age_days: Option<i64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<PipelineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = PipelineConfig::default();

    if let Some(extractor) = raw.extractor {
        if let Some(v) = extractor.tolerance_floor_cents {
            config.extractor.tolerance_floor_cents = v;
        }
        if let Some(v) = extractor.tolerance_percent {
            config.extractor.tolerance_percent = v;
        }
        if let Some(v) = extractor.item_keep_threshold {
            config.extractor.item_keep_threshold = v;
        }
    }

    if let Some(routing) = raw.routing {
        if let Some(v) = routing.confidence_accept {
            config.routing.confidence_accept = v;
        }
        if let Some(v) = routing.confidence_floor {
            config.routing.confidence_floor = v;
        }
        if let Some(v) = routing.min_priced_items {
            config.routing.min_priced_items = v;
        }
        if let Some(v) = routing.discrepancy_escalate {
            config.routing.discrepancy_escalate = v;
        }
    }

    if let Some(breaker) = raw.breaker {
        if let Some(v) = breaker.window_size {
            config.breaker.window_size = v;
        }
        if let Some(v) = breaker.min_calls {
            config.breaker.min_calls = v;
        }
        if let Some(v) = breaker.failure_threshold {
            config.breaker.failure_threshold = v;
        }
        if let Some(v) = breaker.recovery_timeout_secs {
            config.breaker.recovery_timeout = Duration::from_secs(v);
        }
        if let Some(v) = breaker.half_open_successes {
            config.breaker.half_open_successes = v;
        }
        if let Some(v) = breaker.call_timeout_secs {
            config.breaker.call_timeout = Duration::from_secs(v);
        }
    }

    if let Some(llm) = raw.llm {
        if let Some(v) = llm.host {
            config.llm.host = v;
        }
        if let Some(v) = llm.model {
            config.llm.model = v;
        }
        if let Some(v) = llm.max_prompt_bytes {
            config.llm.max_prompt_bytes = v;
        }
        if let Some(v) = llm.max_merged_items {
            config.llm.max_merged_items = v;
        }
        if let Some(v) = llm.merge_confidence_boost {
            config.llm.merge_confidence_boost = v;
        }
    }

    if let Some(cache) = raw.cache {
        if let Some(v) = cache.max_entries {
            config.cache.max_entries = v;
        }
        if let Some(v) = cache.strong_ttl_days {
            config.cache.strong_ttl = Duration::from_secs(v * 24 * 3600);
        }
        if let Some(v) = cache.weak_ttl_days {
            config.cache.weak_ttl = Duration::from_secs(v * 24 * 3600);
        }
    }

    if let Some(alias) = raw.alias {
        if let Some(v) = alias.confidence_floor {
            config.alias.confidence_floor = v;
        }
        if let Some(v) = alias.confidence_ceiling {
            config.alias.confidence_ceiling = v;
        }
        if let Some(v) = alias.user_initial_confidence {
            config.alias.user_initial_confidence = v;
        }
        if let Some(v) = alias.system_initial_confidence {
            config.alias.system_initial_confidence = v;
        }
        if let Some(v) = alias.inactivity_days {
            config.alias.inactivity_days = v;
        }
        if let Some(v) = alias.decay_strategy {
            config.alias.decay_strategy = v
                .parse()
                .map_err(|e: String| Error::Config(e))?;
        }
        if let Some(v) = alias.decay_factor {
            config.alias.decay_factor = v;
        }
        if let Some(v) = alias.boost_min_uses {
            config.alias.boost_min_uses = v;
        }
        if let Some(v) = alias.boost_factor {
            config.alias.boost_factor = v;
        }
        if let Some(v) = alias.prune_confidence {
            config.alias.prune_confidence = v;
        }
        if let Some(v) = alias.prune_min_age_days {
            config.alias.prune_min_age_days = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.routing.confidence_accept, 0.75);
        assert_eq!(config.breaker.min_calls, 5);
        assert_eq!(config.cache.strong_ttl, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.alias.decay_strategy, DecayStrategy::Adaptive);
    }

    #[test]
    fn test_partial_override() {
        let config = parse_config("[routing]\nconfidence_accept = 0.8\n").unwrap();
        assert_eq!(config.routing.confidence_accept, 0.8);
        // Everything else keeps the defaults
        assert_eq!(config.routing.min_priced_items, 3);
        assert_eq!(config.breaker.window_size, 10);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(parse_config("not toml [").is_err());
    }

    #[test]
    fn test_unknown_decay_strategy_rejected() {
        assert!(parse_config("[alias]\ndecay_strategy = \"random\"\n").is_err());
    }
}
