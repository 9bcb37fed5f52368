//! Escalation routing
//!
//! Pure decision function mapping heuristic output to "is an LLM call
//! warranted". No side effects, bit-for-bit reproducible from its inputs.

use crate::config::RoutingConfig;
use crate::models::ParsedReceipt;

/// Decide whether the LLM should be consulted for this receipt
///
/// The accept path comes first: a confident, reconciled receipt never
/// escalates. Everything after it is a reason to escalate.
pub fn should_escalate(receipt: &ParsedReceipt, config: &RoutingConfig) -> bool {
    if receipt.confidence >= config.confidence_accept && receipt.reconciliation_ok {
        return false;
    }

    if receipt.confidence < config.confidence_floor {
        return true;
    }

    if receipt.merchant.is_none() || receipt.total_cents == 0 {
        return true;
    }

    if receipt.priced_item_count() < config.min_priced_items {
        return true;
    }

    if !receipt.reconciliation_ok && discrepancy_ratio(receipt) > config.discrepancy_escalate {
        return true;
    }

    false
}

/// Absolute item-sum/total discrepancy as a fraction of the posted total
pub fn discrepancy_ratio(receipt: &ParsedReceipt) -> f64 {
    let reference = if receipt.subtotal_cents > 0 {
        receipt.subtotal_cents
    } else {
        receipt.total_cents
    };
    if reference == 0 {
        return 1.0;
    }
    (receipt.item_sum_cents() - reference).abs() as f64 / reference as f64
}
