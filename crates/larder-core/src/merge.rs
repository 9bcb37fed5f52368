//! Result merger
//!
//! Combines a heuristic parse with an LLM parse of the same receipt. The
//! heuristic result is the skeleton: high-confidence heuristic items are
//! kept verbatim and LLM items only fill gaps. The LLM never overwrites a
//! value the heuristics extracted with confidence.

use tracing::debug;

use crate::ai::LlmReceipt;
use crate::config::{ExtractorConfig, LlmConfig};
use crate::extract::{category_for, HeuristicExtractor};
use crate::models::{ParseSource, ParsedLineItem, ParsedReceipt};
use crate::normalize::similarity;

/// Token-set similarity above which two item names are the same item
const DUPLICATE_SIMILARITY: f64 = 0.5;

/// Confidence assigned to items that arrive only from the LLM
const LLM_ITEM_CONF: f64 = 0.6;

const MERGED_CONF_CAP: f64 = 0.95;

/// Merge an LLM parse into a heuristic parse
///
/// Returns a new receipt with source `HeuristicsLlm`. Reconciliation is
/// re-run on the merged result since the item set and totals may both
/// have changed.
pub fn merge_results(
    heuristic: &ParsedReceipt,
    llm: &LlmReceipt,
    extractor_config: &ExtractorConfig,
    llm_config: &LlmConfig,
) -> ParsedReceipt {
    let mut merged = heuristic.clone();
    merged.source = ParseSource::HeuristicsLlm;

    // Metadata: fill blanks only
    if merged.merchant.is_none() {
        merged.merchant = llm.merchant.clone();
    }
    if merged.date.is_none() {
        merged.date = llm.date.clone();
    }

    // Totals: the LLM's numbers are adopted only when the heuristics found
    // nothing or what they found does not reconcile
    let totals_suspect = merged.total_cents == 0 || !merged.reconciliation_ok;
    if totals_suspect {
        if let Some(total) = llm.total {
            if total > 0 {
                merged.total_cents = total;
            }
        }
        if let Some(subtotal) = llm.subtotal {
            if subtotal > 0 && merged.subtotal_cents == 0 {
                merged.subtotal_cents = subtotal;
            }
        }
        if let Some(tax) = llm.tax {
            if tax >= 0 && merged.tax_cents == 0 {
                merged.tax_cents = tax;
            }
        }
    }

    // Items: keep confident heuristic items, fill from the LLM
    let kept: Vec<ParsedLineItem> = merged
        .items
        .iter()
        .filter(|i| i.confidence >= extractor_config.item_keep_threshold)
        .cloned()
        .collect();
    let dropped = merged.items.len() - kept.len();
    merged.items = kept;

    let mut added = 0usize;
    for llm_item in &llm.items {
        if merged.items.len() >= llm_config.max_merged_items {
            break;
        }
        if llm_item.price <= 0 || llm_item.item_name.trim().is_empty() {
            continue;
        }
        if is_duplicate(&llm_item.item_name, &merged.items) {
            continue;
        }

        let mut item = ParsedLineItem::new(&llm_item.item_name, &llm_item.item_name, llm_item.price);
        item.quantity = llm_item.quantity.filter(|q| *q > 0.0).unwrap_or(1.0);
        item.category = llm_item
            .category
            .clone()
            .or_else(|| category_for(&llm_item.item_name).map(|c| c.to_string()));
        item.confidence = LLM_ITEM_CONF;
        merged.items.push(item);
        added += 1;
    }

    debug!(
        kept = merged.items.len() - added,
        dropped, added, "merged receipt items"
    );

    // Item set and totals may have moved, so reconcile again
    let extractor = HeuristicExtractor::new(extractor_config.clone());
    merged.reconciliation_ok = extractor.reconcile(&merged);

    // Agreement between the two methods earns a bounded confidence boost
    let incorporated = added > 0 || totals_suspect;
    if incorporated {
        merged.confidence =
            (heuristic.confidence + llm_config.merge_confidence_boost).min(MERGED_CONF_CAP);
    }

    merged
}

/// Name-level duplicate check against already-merged items
fn is_duplicate(candidate: &str, items: &[ParsedLineItem]) -> bool {
    items
        .iter()
        .any(|item| similarity(candidate, &item.item_name) >= DUPLICATE_SIMILARITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::LlmItem;

    fn heuristic_receipt() -> ParsedReceipt {
        let mut item_good = ParsedLineItem::new("MILK 2% GAL 3.99", "MILK 2% GAL", 399);
        item_good.confidence = 0.85;
        let mut item_weak = ParsedLineItem::new("?X@# 1.00", "?X@#", 100);
        item_weak.confidence = 0.4;

        ParsedReceipt {
            merchant: Some("WALMART".to_string()),
            total_cents: 855,
            subtotal_cents: 799,
            tax_cents: 56,
            items: vec![item_good, item_weak],
            confidence: 0.6,
            reconciliation_ok: false,
            source: ParseSource::Heuristics,
            ..Default::default()
        }
    }

    fn llm_receipt() -> LlmReceipt {
        LlmReceipt {
            merchant: Some("WAL-MART SUPERCENTER".to_string()),
            date: Some("2025-01-15".to_string()),
            subtotal: Some(799),
            tax: Some(56),
            total: Some(855),
            items: vec![
                LlmItem {
                    item_name: "MILK 2 PERCENT GALLON".to_string(),
                    price: 399,
                    quantity: Some(1.0),
                    category: Some("dairy".to_string()),
                },
                LlmItem {
                    item_name: "WHEAT BREAD".to_string(),
                    price: 400,
                    quantity: None,
                    category: None,
                },
            ],
        }
    }

    #[test]
    fn test_confident_heuristic_items_survive_weak_ones_drop() {
        let merged = merge_results(
            &heuristic_receipt(),
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        assert!(merged.items.iter().any(|i| i.item_name == "MILK 2% GAL"));
        assert!(!merged.items.iter().any(|i| i.item_name == "?X@#"));
    }

    #[test]
    fn test_llm_fills_missing_items_without_duplicating() {
        let merged = merge_results(
            &heuristic_receipt(),
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        // BREAD arrives from the LLM; the LLM's milk is a duplicate of the
        // kept heuristic milk (shared MILK/GALLON tokens) and is skipped
        assert!(merged.items.iter().any(|i| i.item_name == "WHEAT BREAD"));
        let milk_count = merged
            .items
            .iter()
            .filter(|i| i.item_name.contains("MILK"))
            .count();
        assert_eq!(milk_count, 1);
    }

    #[test]
    fn test_metadata_fills_blanks_never_overwrites() {
        let merged = merge_results(
            &heuristic_receipt(),
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        // Heuristic merchant wins; missing date comes from the LLM
        assert_eq!(merged.merchant.as_deref(), Some("WALMART"));
        assert_eq!(merged.date.as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn test_llm_totals_ignored_when_heuristics_reconciled() {
        let mut heuristic = heuristic_receipt();
        heuristic.reconciliation_ok = true;
        heuristic.total_cents = 900;

        let merged = merge_results(
            &heuristic,
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        assert_eq!(merged.total_cents, 900);
    }

    #[test]
    fn test_llm_total_adopted_when_heuristic_total_missing() {
        let mut heuristic = heuristic_receipt();
        heuristic.total_cents = 0;
        heuristic.subtotal_cents = 0;
        heuristic.tax_cents = 0;

        let merged = merge_results(
            &heuristic,
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        assert_eq!(merged.total_cents, 855);
        assert_eq!(merged.subtotal_cents, 799);
    }

    #[test]
    fn test_merge_boost_is_capped() {
        let mut heuristic = heuristic_receipt();
        heuristic.confidence = 0.92;

        let merged = merge_results(
            &heuristic,
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        assert_eq!(merged.source, ParseSource::HeuristicsLlm);
        assert!(merged.confidence <= MERGED_CONF_CAP);
        assert!(merged.confidence > heuristic.confidence);
    }

    #[test]
    fn test_item_count_bounded() {
        let mut llm = llm_receipt();
        llm.items = (0..200)
            .map(|i| LlmItem {
                item_name: format!("UNIQUE PRODUCT NUMBER {}", i),
                price: 100 + i,
                quantity: None,
                category: None,
            })
            .collect();

        let config = LlmConfig::default();
        let merged = merge_results(
            &heuristic_receipt(),
            &llm,
            &ExtractorConfig::default(),
            &config,
        );
        assert!(merged.items.len() <= config.max_merged_items);
    }

    #[test]
    fn test_reconciliation_rerun_after_merge() {
        // Heuristics alone: one item at 3.99 vs total 8.55, fails.
        // With the LLM's bread at 4.00 plus tax 0.56, sums land on 8.55.
        let merged = merge_results(
            &heuristic_receipt(),
            &llm_receipt(),
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        assert!(merged.reconciliation_ok);
    }

    #[test]
    fn test_unpriced_and_unnamed_llm_items_skipped() {
        let mut llm = llm_receipt();
        llm.items.push(LlmItem {
            item_name: "  ".to_string(),
            price: 500,
            quantity: None,
            category: None,
        });
        llm.items.push(LlmItem {
            item_name: "FREE SAMPLE".to_string(),
            price: 0,
            quantity: None,
            category: None,
        });

        let merged = merge_results(
            &heuristic_receipt(),
            &llm,
            &ExtractorConfig::default(),
            &LlmConfig::default(),
        );
        assert!(!merged.items.iter().any(|i| i.item_name.trim().is_empty()));
        assert!(!merged.items.iter().any(|i| i.item_name == "FREE SAMPLE"));
    }
}
