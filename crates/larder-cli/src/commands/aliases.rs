//! Alias rule management commands

use anyhow::Result;
use larder_core::{Database, PipelineConfig, RuleSource};

use super::truncate;

pub fn cmd_aliases_list(db: &Database, limit: i64, household: Option<i64>) -> Result<()> {
    let rules = db.list_alias_rules(household, limit)?;

    if rules.is_empty() {
        println!();
        println!("No alias rules learned yet.");
        println!("Teach one with: larder aliases learn \"GV WHL MILK\" milk");
        println!();
        return Ok(());
    }

    println!();
    println!(
        "   {:<5} {:<24} {:<7} {:<18} {:<6} {:>5} {:>5} {:>6} {:<10}",
        "ID", "PATTERN", "TYPE", "CLASS", "SRC", "HITS", "MISS", "CONF", "LAST USED"
    );
    println!("   {}", "─".repeat(93));
    for rule in &rules {
        println!(
            "   {:<5} {:<24} {:<7} {:<18} {:<6} {:>5} {:>5} {:>5.0}% {:<10}",
            rule.id,
            truncate(&rule.pattern, 24),
            rule.pattern_type.as_str(),
            truncate(&rule.ingredient_class, 18),
            rule.source.as_str(),
            rule.hit_count,
            rule.miss_count,
            rule.confidence * 100.0,
            rule.last_used.format("%Y-%m-%d")
        );
    }
    println!();
    Ok(())
}

pub fn cmd_aliases_learn(
    db: &Database,
    config: &PipelineConfig,
    text: &str,
    class: &str,
    merchant: Option<&str>,
    household: Option<i64>,
) -> Result<()> {
    let id = db.learn_alias(text, class, merchant, household, RuleSource::User, &config.alias)?;
    let rule = db.get_alias_rule(id)?;
    println!(
        "✅ Learned rule {}: \"{}\" → {} ({:.0}% confidence)",
        id,
        rule.pattern,
        rule.ingredient_class,
        rule.confidence * 100.0
    );
    Ok(())
}

pub fn cmd_aliases_delete(db: &Database, id: i64) -> Result<()> {
    let rule = db.get_alias_rule(id)?;
    db.delete_alias_rule(id)?;
    println!("🗑️  Deleted rule {}: \"{}\" → {}", id, rule.pattern, rule.ingredient_class);
    Ok(())
}

pub fn cmd_aliases_stats(
    db: &Database,
    config: &PipelineConfig,
    household: Option<i64>,
) -> Result<()> {
    let stats = db.alias_stats(household, &config.alias)?;
    println!();
    match household {
        Some(id) => println!("📈 Alias rules (household {}): {}", id, stats.total_rules),
        None => println!("📈 Alias rules: {}", stats.total_rules),
    }
    println!(
        "   user {} / system {} / llm {}",
        stats.user_rules, stats.system_rules, stats.llm_rules
    );
    println!("   avg confidence: {:.0}%", stats.avg_confidence * 100.0);
    println!("   below prune threshold: {}", stats.low_confidence);
    println!();
    Ok(())
}

pub fn cmd_aliases_prune(db: &Database, threshold: f64, min_age_days: i64) -> Result<()> {
    let pruned = db.prune_low_confidence(threshold, min_age_days)?;
    println!(
        "🗑️  Pruned {} rule{} below {:.0}% confidence",
        pruned,
        if pruned == 1 { "" } else { "s" },
        threshold * 100.0
    );
    Ok(())
}

pub fn cmd_aliases_maintain(db: &Database, config: &PipelineConfig) -> Result<()> {
    let report = db.run_alias_maintenance(&config.alias)?;
    println!();
    println!("🔧 Maintenance cycle complete");
    println!("   Examined: {}", report.examined);
    println!("   Decayed:  {}", report.decayed);
    println!("   Boosted:  {}", report.boosted);
    println!("   Pruned:   {}", report.pruned);
    println!();
    Ok(())
}
