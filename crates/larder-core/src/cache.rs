//! Result cache
//!
//! In-process LRU cache over parse results, keyed two ways:
//!
//! - Strong key: SHA-256 of the exact raw OCR text. A byte-identical
//!   re-submission (same photo re-uploaded) hits this key.
//! - Weak key: fingerprint of merchant + date + total. A re-scan of the
//!   same physical receipt produces slightly different OCR bytes but the
//!   same fingerprint, so it still hits, with a shorter TTL since the
//!   match is only probable.
//!
//! Both key kinds embed a pipeline version string, so bumping the version
//! orphans every older entry without a flush ceremony; orphans age out
//! through normal LRU pressure (or an explicit `invalidate_version`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CacheConfig;
use crate::models::ParsedReceipt;

/// Bumped when the parse output shape or semantics change
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Counters for operational visibility
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Entry {
    receipt: ParsedReceipt,
    inserted: Instant,
    /// Monotonic access stamp for LRU ordering
    stamp: u64,
    /// Weak entries expire on the shorter TTL
    weak: bool,
}

struct CacheInner {
    map: HashMap<String, Entry>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Dual-key versioned LRU cache of parse results
pub struct ResultCache {
    config: CacheConfig,
    version: String,
    inner: Mutex<CacheInner>,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_version(config, PIPELINE_VERSION)
    }

    /// Explicit version, used by tests and by version invalidation
    pub fn with_version(config: CacheConfig, version: &str) -> Self {
        Self {
            config,
            version: version.to_string(),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                clock: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
        }
    }

    /// Strong lookup by exact content (image bytes, or the raw OCR text
    /// when no image is available)
    pub fn get_strong(&self, content: &[u8]) -> Option<ParsedReceipt> {
        let key = self.strong_key(content);
        self.get(&key)
    }

    /// Weak lookup by receipt fingerprint
    pub fn get_weak(
        &self,
        merchant: Option<&str>,
        date: Option<&str>,
        total_cents: i64,
        line_count: usize,
    ) -> Option<ParsedReceipt> {
        let key = self.weak_key(merchant, date, total_cents, line_count)?;
        self.get(&key)
    }

    /// Store a result under the strong key and, when the receipt carries
    /// enough identity, the weak key too
    pub fn put(&self, content: &[u8], line_count: usize, receipt: &ParsedReceipt) {
        let strong = self.strong_key(content);
        self.insert(strong, receipt, false);

        if let Some(weak) = self.weak_key(
            receipt.merchant.as_deref(),
            receipt.date.as_deref(),
            receipt.total_cents,
            line_count,
        ) {
            self.insert(weak, receipt, true);
        }
    }

    /// Drop every entry regardless of version, for schema or pipeline
    /// version changes
    pub fn invalidate_version(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            entries: inner.map.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }

    fn get(&self, key: &str) -> Option<ParsedReceipt> {
        enum Outcome {
            Miss,
            Expired,
            Hit(ParsedReceipt),
        }

        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.clock += 1;
        let stamp = inner.clock;

        let outcome = match inner.map.get_mut(key) {
            None => Outcome::Miss,
            Some(entry) => {
                let ttl = if entry.weak {
                    self.config.weak_ttl
                } else {
                    self.config.strong_ttl
                };
                if entry.inserted.elapsed() > ttl {
                    Outcome::Expired
                } else {
                    entry.stamp = stamp;
                    Outcome::Hit(entry.receipt.clone())
                }
            }
        };

        match outcome {
            Outcome::Miss => {
                inner.misses += 1;
                None
            }
            Outcome::Expired => {
                inner.map.remove(key);
                inner.expirations += 1;
                inner.misses += 1;
                None
            }
            Outcome::Hit(receipt) => {
                inner.hits += 1;
                Some(receipt)
            }
        }
    }

    fn insert(&self, key: String, receipt: &ParsedReceipt, weak: bool) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        // Evict the least recently used entry once at capacity
        if inner.map.len() >= self.config.max_entries && !inner.map.contains_key(&key) {
            if let Some(lru_key) = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.stamp)
                .map(|(k, _)| k.clone())
            {
                inner.map.remove(&lru_key);
                inner.evictions += 1;
                debug!("cache evicted least recently used entry");
            }
        }

        inner.clock += 1;
        let stamp = inner.clock;
        inner.map.insert(
            key,
            Entry {
                receipt: receipt.clone(),
                inserted: Instant::now(),
                stamp,
                weak,
            },
        );
    }

    fn strong_key(&self, content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{}:s:{}", self.version, hex::encode(hasher.finalize()))
    }

    /// Fingerprint requires at least merchant and total to be present;
    /// without them a weak match would collide far too often. The line
    /// count is bucketed to multiples of 10 so OCR noise that gains or
    /// loses a line or two still lands on the same key.
    fn weak_key(
        &self,
        merchant: Option<&str>,
        date: Option<&str>,
        total_cents: i64,
        line_count: usize,
    ) -> Option<String> {
        let merchant = merchant?.trim().to_uppercase();
        if merchant.is_empty() || total_cents <= 0 {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(merchant.as_bytes());
        hasher.update(b"|");
        hasher.update(date.unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(total_cents.to_string().as_bytes());
        // Single-currency input today; keyed so multi-currency stays a
        // data change rather than a schema change
        hasher.update(b"|USD|");
        hasher.update(((line_count / 10) * 10).to_string().as_bytes());
        Some(format!("{}:w:{}", self.version, hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CacheConfig {
        CacheConfig {
            max_entries: 3,
            strong_ttl: Duration::from_secs(3600),
            weak_ttl: Duration::from_secs(3600),
        }
    }

    fn receipt(merchant: &str, total: i64) -> ParsedReceipt {
        ParsedReceipt {
            merchant: Some(merchant.to_string()),
            date: Some("2025-01-15".to_string()),
            total_cents: total,
            ..Default::default()
        }
    }

    #[test]
    fn test_strong_hit_on_identical_text() {
        let cache = ResultCache::new(small_config());
        let r = receipt("WALMART", 3200);
        cache.put(b"WALMART\nTOTAL 32.00", 2, &r);

        let hit = cache.get_strong(b"WALMART\nTOTAL 32.00").unwrap();
        assert_eq!(hit.total_cents, 3200);
        assert!(cache.get_strong(b"WALMART\nTOTAL 32.01").is_none());
    }

    #[test]
    fn test_weak_hit_on_rescan_with_different_bytes() {
        let cache = ResultCache::new(small_config());
        let r = receipt("WALMART", 3200);
        cache.put(b"WALMART\nT0TAL 32.OO garbled", 2, &r);

        // Different OCR bytes and a slightly different line count, same
        // fingerprint bucket
        let hit = cache
            .get_weak(Some("WALMART"), Some("2025-01-15"), 3200, 4)
            .unwrap();
        assert_eq!(hit.merchant.as_deref(), Some("WALMART"));
        assert!(cache
            .get_weak(Some("WALMART"), Some("2025-01-15"), 3300, 4)
            .is_none());
        // A very different line count lands in another bucket
        assert!(cache
            .get_weak(Some("WALMART"), Some("2025-01-15"), 3200, 27)
            .is_none());
    }

    #[test]
    fn test_no_weak_key_without_merchant_or_total() {
        let cache = ResultCache::new(small_config());
        let r = ParsedReceipt {
            total_cents: 3200,
            ..Default::default()
        };
        cache.put(b"anonymous receipt", 1, &r);
        assert!(cache.get_weak(None, None, 3200, 1).is_none());
        // Strong key still works
        assert!(cache.get_strong(b"anonymous receipt").is_some());
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = ResultCache::new(CacheConfig {
            max_entries: 2,
            ..small_config()
        });
        // Receipts without merchants produce only strong entries
        let anon = ParsedReceipt::default();
        cache.put(b"text-a", 1, &anon);
        cache.put(b"text-b", 1, &anon);

        // Touch a so b is the least recently used
        assert!(cache.get_strong(b"text-a").is_some());
        cache.put(b"text-c", 1, &anon);

        assert!(cache.get_strong(b"text-a").is_some());
        assert!(cache.get_strong(b"text-b").is_none());
        assert!(cache.get_strong(b"text-c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ResultCache::new(CacheConfig {
            max_entries: 10,
            strong_ttl: Duration::from_millis(0),
            weak_ttl: Duration::from_millis(0),
        });
        let anon = ParsedReceipt::default();
        cache.put(b"text", 1, &anon);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_strong(b"text").is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_version_bump_orphans_old_entries() {
        let config = small_config();
        let old = ResultCache::with_version(config.clone(), "1");
        old.put(b"text", 1, &receipt("WALMART", 3200));
        assert!(old.get_strong(b"text").is_some());

        // Same backing semantics, new version: old entries unreachable
        let new = ResultCache::with_version(config, "2");
        assert!(new.get_strong(b"text").is_none());
    }

    #[test]
    fn test_invalidate_version_clears_everything() {
        let cache = ResultCache::new(small_config());
        cache.put(b"text", 1, &receipt("WALMART", 3200));
        cache.invalidate_version();
        assert!(cache.get_strong(b"text").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = ResultCache::new(small_config());
        cache.put(b"text", 1, &ParsedReceipt::default());
        let _ = cache.get_strong(b"text");
        let _ = cache.get_strong(b"other");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
