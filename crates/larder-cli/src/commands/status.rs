//! Status command

use std::path::{Path, PathBuf};

use anyhow::Result;
use larder_core::{LlmBackend, LlmClient};

use super::{load_config, open_db};

pub async fn cmd_status(db_path: &Path, config_path: Option<&PathBuf>) -> Result<()> {
    println!();
    println!("📊 Larder Status");
    println!("   ─────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());
    if db_path.exists() {
        if let Ok(metadata) = std::fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let config = load_config(config_path)?;

    println!();
    println!("   Routing: accept ≥ {:.0}%, floor {:.0}%, min {} priced items",
        config.routing.confidence_accept * 100.0,
        config.routing.confidence_floor * 100.0,
        config.routing.min_priced_items
    );
    println!(
        "   Breaker: {} call window, trips at {:.0}% failures, {}s recovery",
        config.breaker.window_size,
        config.breaker.failure_threshold * 100.0,
        config.breaker.recovery_timeout.as_secs()
    );

    // LLM backend reachability
    match LlmClient::from_env(&config.llm) {
        Some(llm) => {
            let healthy = llm.health_check().await;
            let mark = if healthy { "🟢" } else { "🔴" };
            println!(
                "   LLM: {} {} ({}) at {}",
                mark,
                if healthy { "reachable" } else { "unreachable" },
                llm.model(),
                llm.host()
            );
        }
        None => println!("   LLM: not configured (heuristics only)"),
    }

    // Alias store stats
    if db_path.exists() {
        match open_db(db_path) {
            Ok(db) => {
                let stats = db.alias_stats(None, &config.alias)?;
                println!();
                println!("   Alias rules: {}", stats.total_rules);
                println!(
                    "     user {} / system {} / llm {}",
                    stats.user_rules, stats.system_rules, stats.llm_rules
                );
                println!("     avg confidence: {:.0}%", stats.avg_confidence * 100.0);
                if stats.low_confidence > 0 {
                    println!(
                        "     {} below prune threshold (run: larder aliases maintain)",
                        stats.low_confidence
                    );
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
            }
        }
    }

    println!();
    Ok(())
}
