//! Receipt parsing command

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use larder_core::{LlmClient, ParseRequest, ReceiptPipeline};

use super::{dollars, load_config, open_db, truncate};

#[allow(clippy::too_many_arguments)]
pub async fn cmd_parse(
    db_path: &Path,
    config_path: Option<&PathBuf>,
    file: &Path,
    store: Option<&str>,
    force_llm: bool,
    household: Option<i64>,
    json: bool,
) -> Result<()> {
    let ocr_text = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read OCR text from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };

    let config = load_config(config_path)?;
    let db = open_db(db_path)?;
    let llm = LlmClient::from_env(&config.llm);
    let pipeline = ReceiptPipeline::new(config, db, llm);

    let request = ParseRequest {
        ocr_text,
        store_hint: store.map(|s| s.to_string()),
        force_llm,
        household_id: household,
        ..Default::default()
    };

    let outcome = pipeline.parse(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let receipt = &outcome.receipt;
    println!();
    println!("🧾 {}", receipt.merchant.as_deref().unwrap_or("(unknown merchant)"));
    if let Some(ref date) = receipt.date {
        match receipt.time {
            Some(ref time) => println!("   {} {}", date, time),
            None => println!("   {}", date),
        }
    }
    println!(
        "   Source: {}   Confidence: {:.0}%   {}",
        outcome.source.as_str(),
        receipt.confidence * 100.0,
        if outcome.reconciliation.ok {
            "✓ reconciled"
        } else {
            "✗ not reconciled"
        }
    );
    println!();

    for (item, resolution) in receipt.items.iter().zip(&outcome.item_resolutions) {
        let class = resolution
            .resolved
            .as_ref()
            .map(|r| format!("  → {}", r.ingredient_class))
            .unwrap_or_default();
        println!(
            "   {:<32} {:>9}{}",
            truncate(&item.item_name, 32),
            dollars(item.price_cents),
            class
        );
    }

    println!();
    if receipt.subtotal_cents > 0 {
        println!("   Subtotal: {:>9}", dollars(receipt.subtotal_cents));
    }
    if receipt.tax_cents > 0 {
        println!("   Tax:      {:>9}", dollars(receipt.tax_cents));
    }
    if receipt.savings_cents > 0 {
        println!("   Savings:  {:>9}", dollars(receipt.savings_cents));
    }
    println!("   Total:    {:>9}", dollars(receipt.total_cents));

    if !outcome.redacted_pii.is_empty() {
        println!();
        println!("   ⚠️  PII redacted: {}", outcome.redacted_pii.join(", "));
    }
    println!();
    println!("   ({} ms)", outcome.processing_time_ms);
    println!();

    Ok(())
}
