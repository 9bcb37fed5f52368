//! Alias rule storage, resolution, and confidence maintenance
//!
//! Rules map normalized receipt text to canonical ingredient classes.
//! Resolution walks a scope ladder from most to least specific; the first
//! scope with a match wins, so a household's own rule always beats a
//! global one. Confidence is adjusted by use: hits on resolution,
//! reinforcement on repeated corrections, decay/boost/prune in the
//! periodic maintenance cycle.

use regex::Regex;
use rusqlite::params;
use tracing::{debug, info, warn};

use super::{parse_datetime, Database};
use crate::config::{AliasConfig, DecayStrategy};
use crate::error::Result;
use crate::models::{AliasRule, PatternType, ResolvedAlias, RuleSource};
use crate::normalize::{dominant_token, extract_key_tokens, normalize};

/// Fraction of the remaining gap to 1.0 closed when a correction
/// re-confirms an existing rule; each confirmation moves confidence
/// multiplicatively toward certainty
const REINFORCE_RATE: f64 = 0.5;

/// Token rules learned alongside an exact rule start this much lower
const TOKEN_RULE_PENALTY: f64 = 0.1;

/// Outcome of one maintenance cycle
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub examined: usize,
    pub decayed: usize,
    pub boosted: usize,
    pub pruned: usize,
}

/// Aggregate rule statistics for the status command
#[derive(Debug, Clone, Default)]
pub struct AliasStats {
    pub total_rules: i64,
    pub user_rules: i64,
    pub system_rules: i64,
    pub llm_rules: i64,
    pub avg_confidence: f64,
    /// Rules currently below the prune threshold
    pub low_confidence: i64,
}

const RULE_COLUMNS: &str = "id, pattern, pattern_type, ingredient_class, merchant, \
     household_id, confidence, hit_count, miss_count, source, last_used, created_at";

fn rule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AliasRule> {
    let pattern_type_str: String = row.get(2)?;
    let source_str: String = row.get(9)?;
    let last_used_str: String = row.get(10)?;
    let created_at_str: String = row.get(11)?;

    Ok(AliasRule {
        id: row.get(0)?,
        pattern: row.get(1)?,
        pattern_type: pattern_type_str.parse().unwrap_or(PatternType::Exact),
        ingredient_class: row.get(3)?,
        merchant: row.get(4)?,
        household_id: row.get(5)?,
        confidence: row.get(6)?,
        hit_count: row.get(7)?,
        miss_count: row.get(8)?,
        source: source_str.parse().unwrap_or(RuleSource::System),
        last_used: parse_datetime(&last_used_str),
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Resolve raw item text to an ingredient class
    ///
    /// Scope ladder: household+merchant, household, merchant, global.
    /// Within a scope, an exact-pattern match always beats a token match,
    /// which beats a regex match; only rules of the same pattern type break
    /// ties on net hits (hits - misses), then confidence. A successful
    /// resolution records a hit on the rule.
    pub fn resolve_alias(
        &self,
        raw_text: &str,
        merchant: Option<&str>,
        household_id: Option<i64>,
    ) -> Result<Option<ResolvedAlias>> {
        let normalized = normalize(raw_text);
        if normalized.is_empty() {
            return Ok(None);
        }
        let tokens = extract_key_tokens(raw_text);

        let merchant_upper = merchant.map(|m| m.trim().to_uppercase());
        let mut scopes: Vec<(Option<i64>, Option<&str>)> = Vec::new();
        if household_id.is_some() && merchant_upper.is_some() {
            scopes.push((household_id, merchant_upper.as_deref()));
        }
        if household_id.is_some() {
            scopes.push((household_id, None));
        }
        if merchant_upper.is_some() {
            scopes.push((None, merchant_upper.as_deref()));
        }
        scopes.push((None, None));

        let conn = self.conn()?;
        for (scope_household, scope_merchant) in scopes {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM alias_rules \
                 WHERE household_id IS ?1 AND merchant IS ?2 \
                 ORDER BY CASE pattern_type \
                            WHEN 'exact' THEN 0 WHEN 'token' THEN 1 ELSE 2 END, \
                          (hit_count - miss_count) DESC, confidence DESC",
                RULE_COLUMNS
            ))?;
            let rules = stmt
                .query_map(params![scope_household, scope_merchant], rule_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for rule in rules {
                if !rule_matches(&rule, &normalized, &tokens) {
                    continue;
                }
                conn.execute(
                    "UPDATE alias_rules \
                     SET hit_count = hit_count + 1, last_used = CURRENT_TIMESTAMP \
                     WHERE id = ?1",
                    params![rule.id],
                )?;
                debug!(
                    rule_id = rule.id,
                    class = %rule.ingredient_class,
                    "alias resolved"
                );
                return Ok(Some(ResolvedAlias {
                    ingredient_class: rule.ingredient_class,
                    confidence: rule.confidence,
                    pattern_type: rule.pattern_type,
                    rule_id: rule.id,
                }));
            }
        }

        Ok(None)
    }

    /// Learn (or reinforce) a rule from a correction
    ///
    /// Creates an exact rule on the normalized text. A repeated correction
    /// for the same mapping reinforces the existing rule instead of
    /// duplicating it. A lower-confidence token rule on the dominant token
    /// is learned alongside, so "GV WHL MILK" can later match "WHL MILK 2%".
    /// Returns the id of the exact rule.
    pub fn learn_alias(
        &self,
        raw_text: &str,
        ingredient_class: &str,
        merchant: Option<&str>,
        household_id: Option<i64>,
        source: RuleSource,
        config: &AliasConfig,
    ) -> Result<i64> {
        let normalized = normalize(raw_text);
        if normalized.is_empty() || ingredient_class.trim().is_empty() {
            return Err(crate::error::Error::InvalidData(
                "Cannot learn an alias from empty text or class".into(),
            ));
        }
        let merchant_upper = merchant.map(|m| m.trim().to_uppercase());
        let class = ingredient_class.trim().to_lowercase();

        let initial = match source {
            RuleSource::User => config.user_initial_confidence,
            RuleSource::System | RuleSource::Llm => config.system_initial_confidence,
        };

        let exact_id = self.upsert_rule(
            &normalized,
            PatternType::Exact,
            &class,
            merchant_upper.as_deref(),
            household_id,
            source,
            initial,
            config,
        )?;

        if let Some(token) = dominant_token(raw_text) {
            if token != normalized {
                let token_conf = (initial - TOKEN_RULE_PENALTY).max(config.confidence_floor);
                self.upsert_rule(
                    &token,
                    PatternType::Token,
                    &class,
                    merchant_upper.as_deref(),
                    household_id,
                    source,
                    token_conf,
                    config,
                )?;
            }
        }

        Ok(exact_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn upsert_rule(
        &self,
        pattern: &str,
        pattern_type: PatternType,
        ingredient_class: &str,
        merchant: Option<&str>,
        household_id: Option<i64>,
        source: RuleSource,
        initial_confidence: f64,
        config: &AliasConfig,
    ) -> Result<i64> {
        let conn = self.conn()?;

        // Reinforce an existing identical mapping
        let existing: Option<(i64, f64)> = conn
            .query_row(
                "SELECT id, confidence FROM alias_rules \
                 WHERE pattern = ?1 AND pattern_type = ?2 AND ingredient_class = ?3 \
                   AND merchant IS ?4 AND household_id IS ?5",
                params![
                    pattern,
                    pattern_type.as_str(),
                    ingredient_class,
                    merchant,
                    household_id
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if let Some((id, confidence)) = existing {
            let reinforced =
                (1.0 - (1.0 - confidence) * (1.0 - REINFORCE_RATE)).min(config.confidence_ceiling);
            conn.execute(
                "UPDATE alias_rules \
                 SET confidence = ?1, hit_count = hit_count + 1, \
                     last_used = CURRENT_TIMESTAMP \
                 WHERE id = ?2",
                params![reinforced, id],
            )?;
            debug!(rule_id = id, confidence = reinforced, "alias rule reinforced");
            return Ok(id);
        }

        let clamped = initial_confidence.clamp(config.confidence_floor, config.confidence_ceiling);
        conn.execute(
            "INSERT INTO alias_rules \
             (pattern, pattern_type, ingredient_class, merchant, household_id, \
              confidence, source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pattern,
                pattern_type.as_str(),
                ingredient_class,
                merchant,
                household_id,
                clamped,
                source.as_str()
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(
            rule_id = id,
            pattern = %pattern,
            class = %ingredient_class,
            "alias rule learned"
        );
        Ok(id)
    }

    /// Record that a resolution was wrong (the user corrected it)
    pub fn record_alias_miss(&self, rule_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE alias_rules SET miss_count = miss_count + 1 WHERE id = ?1",
            params![rule_id],
        )?;
        if updated == 0 {
            return Err(crate::error::Error::NotFound(format!(
                "alias rule {}",
                rule_id
            )));
        }
        Ok(())
    }

    /// Run one decay/boost/prune maintenance cycle
    ///
    /// Decay hits rules idle past the inactivity window, with exact rules
    /// decaying slower than token/regex rules. Boost rewards rules that are
    /// both active and well used. Prune deletes low-confidence non-user
    /// rules past the minimum age; user rules are clamped to the floor but
    /// never deleted.
    pub fn run_alias_maintenance(&self, config: &AliasConfig) -> Result<MaintenanceReport> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut report = MaintenanceReport::default();

        let inactivity = format!("-{} days", config.inactivity_days);
        let min_age = format!("-{} days", config.prune_min_age_days);

        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM alias_rules \
                 WHERE last_used < datetime('now', ?1) AND source != 'user'",
                RULE_COLUMNS
            ))?;
            let idle_rules = stmt
                .query_map(params![inactivity], rule_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for rule in &idle_rules {
                report.examined += 1;
                let raw = decayed_confidence(rule, config);
                if raw < config.confidence_floor && rule.hit_count == 0 {
                    // Never earned a hit and faded out entirely
                    tx.execute("DELETE FROM alias_rules WHERE id = ?1", params![rule.id])?;
                    report.pruned += 1;
                    continue;
                }
                let new_conf = raw.max(config.confidence_floor);
                if new_conf < rule.confidence {
                    tx.execute(
                        "UPDATE alias_rules SET confidence = ?1 WHERE id = ?2",
                        params![new_conf, rule.id],
                    )?;
                    report.decayed += 1;
                }
            }
        }

        report.boosted = tx.execute(
            "UPDATE alias_rules \
             SET confidence = min(?1, confidence * ?2) \
             WHERE last_used >= datetime('now', ?3) \
               AND hit_count >= ?4 \
               AND hit_count >= 2 * miss_count \
               AND confidence * ?2 > confidence",
            params![
                config.confidence_ceiling,
                config.boost_factor,
                inactivity,
                config.boost_min_uses
            ],
        )?;

        report.pruned += tx.execute(
            "DELETE FROM alias_rules \
             WHERE confidence < ?1 \
               AND source != 'user' \
               AND miss_count > 2 * hit_count \
               AND created_at < datetime('now', ?2)",
            params![config.prune_confidence, min_age],
        )?;

        tx.execute(
            "INSERT INTO alias_maintenance_log (examined, decayed, boosted, pruned) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                report.examined as i64,
                report.decayed as i64,
                report.boosted as i64,
                report.pruned as i64
            ],
        )?;

        tx.commit()?;
        info!(
            examined = report.examined,
            decayed = report.decayed,
            boosted = report.boosted,
            pruned = report.pruned,
            "alias maintenance cycle complete"
        );
        Ok(report)
    }

    /// Aggregate statistics, optionally scoped to one household
    pub fn alias_stats(
        &self,
        household_id: Option<i64>,
        config: &AliasConfig,
    ) -> Result<AliasStats> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(source = 'user'), 0), \
                    COALESCE(SUM(source = 'system'), 0), \
                    COALESCE(SUM(source = 'llm'), 0), \
                    COALESCE(AVG(confidence), 0.0), \
                    COALESCE(SUM(confidence < ?1), 0) \
             FROM alias_rules \
             WHERE ?2 IS NULL OR household_id IS ?2",
            params![config.prune_confidence, household_id],
            |row| {
                Ok(AliasStats {
                    total_rules: row.get(0)?,
                    user_rules: row.get(1)?,
                    system_rules: row.get(2)?,
                    llm_rules: row.get(3)?,
                    avg_confidence: row.get(4)?,
                    low_confidence: row.get(5)?,
                })
            },
        )
        .map_err(|e| e.into())
    }

    /// One-off prune by explicit threshold, outside the maintenance cycle
    ///
    /// User rules are exempt here too.
    pub fn prune_low_confidence(&self, threshold: f64, min_age_days: i64) -> Result<usize> {
        let conn = self.conn()?;
        let min_age = format!("-{} days", min_age_days);
        let pruned = conn.execute(
            "DELETE FROM alias_rules \
             WHERE confidence < ?1 \
               AND source != 'user' \
               AND created_at < datetime('now', ?2)",
            params![threshold, min_age],
        )?;
        Ok(pruned)
    }

    /// List rules, most recently used first
    pub fn list_alias_rules(
        &self,
        household_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<AliasRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alias_rules \
             WHERE ?1 IS NULL OR household_id IS ?1 \
             ORDER BY last_used DESC LIMIT ?2",
            RULE_COLUMNS
        ))?;
        let rules = stmt
            .query_map(params![household_id, limit], rule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    /// Fetch a single rule
    pub fn get_alias_rule(&self, id: i64) -> Result<AliasRule> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM alias_rules WHERE id = ?1", RULE_COLUMNS),
            params![id],
            rule_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                crate::error::Error::NotFound(format!("alias rule {}", id))
            }
            other => other.into(),
        })
    }

    /// Delete a rule by id (manual removal, allowed for any source)
    pub fn delete_alias_rule(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM alias_rules WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(crate::error::Error::NotFound(format!(
                "alias rule {}",
                id
            )));
        }
        Ok(())
    }
}

/// Does this rule match the normalized text?
fn rule_matches(rule: &AliasRule, normalized: &str, tokens: &[String]) -> bool {
    match rule.pattern_type {
        PatternType::Exact => rule.pattern == normalized,
        PatternType::Token => tokens.iter().any(|t| t == &rule.pattern),
        PatternType::Regex => match Regex::new(&rule.pattern) {
            Ok(re) => re.is_match(normalized),
            Err(e) => {
                warn!(rule_id = rule.id, error = %e, "invalid regex pattern in alias rule");
                false
            }
        },
    }
}

/// New confidence for an idle rule, unclamped
///
/// The maintenance cycle clamps the result to the floor, or deletes the
/// rule outright when it would fall below the floor with zero hits.
/// Exact rules decay at the square root of the factor (closer to 1, so
/// slower): an exact match that was right once is likely still right,
/// while token and regex rules over-generalize and should fade faster.
fn decayed_confidence(rule: &AliasRule, config: &AliasConfig) -> f64 {
    match config.decay_strategy {
        DecayStrategy::Linear => {
            let mut step = 1.0 - config.decay_factor;
            if rule.pattern_type == PatternType::Exact {
                step /= 2.0;
            }
            rule.confidence - step
        }
        DecayStrategy::Exponential => {
            let mut factor = config.decay_factor;
            if rule.pattern_type == PatternType::Exact {
                factor = factor.sqrt();
            }
            rule.confidence * factor
        }
        DecayStrategy::Adaptive => {
            // Scale decay by the observed miss ratio: a rule that keeps
            // being corrected fades faster than one that was merely idle
            let uses = rule.hit_count + rule.miss_count;
            let miss_ratio = if uses > 0 {
                rule.miss_count as f64 / uses as f64
            } else {
                0.0
            };
            let mut factor = config.decay_factor * (1.0 - 0.5 * miss_ratio);
            if rule.pattern_type == PatternType::Exact {
                factor = factor.sqrt();
            }
            rule.confidence * factor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn db() -> Database {
        Database::in_memory().unwrap()
    }

    fn config() -> AliasConfig {
        AliasConfig::default()
    }

    /// Shift a rule's timestamps into the past for maintenance tests
    fn age_rule(db: &Database, id: i64, days: i64) {
        let conn = db.conn().unwrap();
        let shift = format!("-{} days", days);
        conn.execute(
            "UPDATE alias_rules \
             SET last_used = datetime('now', ?1), created_at = datetime('now', ?1) \
             WHERE id = ?2",
            params![shift, id],
        )
        .unwrap();
    }

    #[test]
    fn test_learn_then_resolve_exact() {
        let db = db();
        db.learn_alias("GV WHL MILK", "milk", None, None, RuleSource::User, &config())
            .unwrap();

        let resolved = db.resolve_alias("GV WHL MILK", None, None).unwrap().unwrap();
        assert_eq!(resolved.ingredient_class, "milk");
        assert_eq!(resolved.pattern_type, PatternType::Exact);
        assert_eq!(resolved.confidence, config().user_initial_confidence);
    }

    #[test]
    fn test_token_rule_generalizes() {
        let db = db();
        db.learn_alias("CHKN BRST", "chicken breast", None, None, RuleSource::User, &config())
            .unwrap();

        // Different raw text, shared dominant token CHICKEN
        let resolved = db.resolve_alias("CHICKEN THIGHS", None, None).unwrap().unwrap();
        assert_eq!(resolved.ingredient_class, "chicken breast");
        assert_eq!(resolved.pattern_type, PatternType::Token);
        // Token rules start below the exact rule
        assert!(resolved.confidence < config().user_initial_confidence);
    }

    #[test]
    fn test_household_scope_beats_global() {
        let db = db();
        let cfg = config();
        db.learn_alias("SALSA VERDE", "condiment", None, None, RuleSource::System, &cfg)
            .unwrap();
        db.learn_alias("SALSA VERDE", "cooking sauce", None, Some(7), RuleSource::User, &cfg)
            .unwrap();

        let scoped = db.resolve_alias("SALSA VERDE", None, Some(7)).unwrap().unwrap();
        assert_eq!(scoped.ingredient_class, "cooking sauce");

        let global = db.resolve_alias("SALSA VERDE", None, None).unwrap().unwrap();
        assert_eq!(global.ingredient_class, "condiment");
    }

    #[test]
    fn test_merchant_scope_beats_global() {
        let db = db();
        let cfg = config();
        db.learn_alias("MEXICAN BLEND", "shredded cheese", Some("KROGER"), None, RuleSource::User, &cfg)
            .unwrap();
        db.learn_alias("MEXICAN BLEND", "spice mix", None, None, RuleSource::System, &cfg)
            .unwrap();

        let at_kroger = db
            .resolve_alias("MEXICAN BLEND", Some("KROGER"), None)
            .unwrap()
            .unwrap();
        assert_eq!(at_kroger.ingredient_class, "shredded cheese");

        let elsewhere = db
            .resolve_alias("MEXICAN BLEND", Some("ALDI"), None)
            .unwrap()
            .unwrap();
        assert_eq!(elsewhere.ingredient_class, "spice mix");
    }

    #[test]
    fn test_resolution_records_hit() {
        let db = db();
        let id = db
            .learn_alias("EGGS LARGE DOZEN", "eggs", None, None, RuleSource::User, &config())
            .unwrap();
        let before = db.get_alias_rule(id).unwrap().hit_count;

        db.resolve_alias("EGGS LARGE DOZEN", None, None).unwrap().unwrap();
        let after = db.get_alias_rule(id).unwrap().hit_count;
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_repeated_correction_reinforces_not_duplicates() {
        let db = db();
        let cfg = config();
        let first = db
            .learn_alias("OAT BEVERAGE", "oat milk", None, None, RuleSource::System, &cfg)
            .unwrap();
        let second = db
            .learn_alias("OAT BEVERAGE", "oat milk", None, None, RuleSource::System, &cfg)
            .unwrap();
        assert_eq!(first, second);

        // Each confirmation closes half the remaining gap to 1.0
        let rule = db.get_alias_rule(first).unwrap();
        let expected = 1.0 - (1.0 - cfg.system_initial_confidence) * 0.5;
        assert!((rule.confidence - expected).abs() < 1e-9);
        assert!(rule.confidence <= cfg.confidence_ceiling);

        db.learn_alias("OAT BEVERAGE", "oat milk", None, None, RuleSource::System, &cfg)
            .unwrap();
        let rule = db.get_alias_rule(first).unwrap();
        let expected = 1.0 - (1.0 - expected) * 0.5;
        assert!((rule.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_record_miss() {
        let db = db();
        let id = db
            .learn_alias("APPLE FUJI", "apples", None, None, RuleSource::User, &config())
            .unwrap();
        db.record_alias_miss(id).unwrap();
        assert_eq!(db.get_alias_rule(id).unwrap().miss_count, 1);

        assert!(db.record_alias_miss(99999).is_err());
    }

    #[test]
    fn test_net_hits_break_ties() {
        let db = db();
        let cfg = config();
        // Two exact rules for the same pattern, different classes
        let losing = db
            .upsert_rule("BAGEL PLAIN", PatternType::Exact, "pastry", None, None, RuleSource::System, 0.6, &cfg)
            .unwrap();
        let winning = db
            .upsert_rule("BAGEL PLAIN", PatternType::Exact, "bread", None, None, RuleSource::System, 0.6, &cfg)
            .unwrap();

        let conn = db.conn().unwrap();
        conn.execute("UPDATE alias_rules SET hit_count = 10 WHERE id = ?1", params![winning])
            .unwrap();
        conn.execute(
            "UPDATE alias_rules SET hit_count = 10, miss_count = 8 WHERE id = ?1",
            params![losing],
        )
        .unwrap();
        drop(conn);

        let resolved = db.resolve_alias("BAGEL PLAIN", None, None).unwrap().unwrap();
        assert_eq!(resolved.ingredient_class, "bread");
    }

    #[test]
    fn test_exact_rule_beats_well_used_token_rule() {
        let db = db();
        let cfg = config();
        let token = db
            .upsert_rule("MILK", PatternType::Token, "generic dairy", None, None, RuleSource::System, 0.9, &cfg)
            .unwrap();
        db.upsert_rule("MILK GALLON", PatternType::Exact, "whole milk", None, None, RuleSource::System, 0.6, &cfg)
            .unwrap();
        let conn = db.conn().unwrap();
        conn.execute("UPDATE alias_rules SET hit_count = 20 WHERE id = ?1", params![token])
            .unwrap();
        drop(conn);

        // Both rules match, but precedence is by pattern type, not usage
        let resolved = db.resolve_alias("MILK GAL", None, None).unwrap().unwrap();
        assert_eq!(resolved.ingredient_class, "whole milk");
        assert_eq!(resolved.pattern_type, PatternType::Exact);
    }

    #[test]
    fn test_maintenance_decays_idle_rules() {
        let db = db();
        let cfg = config();
        let id = db
            .learn_alias("PASTA PENNE", "pasta", None, None, RuleSource::System, &cfg)
            .unwrap();
        let before = db.get_alias_rule(id).unwrap().confidence;
        age_rule(&db, id, cfg.inactivity_days + 3);

        let report = db.run_alias_maintenance(&cfg).unwrap();
        assert!(report.decayed >= 1);

        let after = db.get_alias_rule(id).unwrap().confidence;
        assert!(after < before);
        assert!(after >= cfg.confidence_floor);
    }

    #[test]
    fn test_decay_clamps_at_floor_for_rules_with_hits() {
        let db = db();
        let cfg = config();
        let id = db
            .learn_alias("RICE JASMINE", "rice", None, None, RuleSource::System, &cfg)
            .unwrap();
        let conn = db.conn().unwrap();
        conn.execute("UPDATE alias_rules SET hit_count = 1 WHERE id = ?1", params![id])
            .unwrap();
        drop(conn);
        for _ in 0..50 {
            age_rule(&db, id, cfg.inactivity_days + 3);
            db.run_alias_maintenance(&cfg).unwrap();
        }
        let rule = db.get_alias_rule(id).unwrap();
        assert!(rule.confidence >= cfg.confidence_floor);
    }

    #[test]
    fn test_decayed_out_rule_with_zero_hits_is_deleted() {
        let db = db();
        let cfg = config();
        let id = db
            .upsert_rule(
                "STALE GUESS",
                PatternType::Exact,
                "unknown",
                None,
                None,
                RuleSource::System,
                cfg.confidence_floor,
                &cfg,
            )
            .unwrap();
        age_rule(&db, id, cfg.inactivity_days + 3);
        let report = db.run_alias_maintenance(&cfg).unwrap();
        assert!(report.pruned >= 1);
        assert!(db.get_alias_rule(id).is_err());
    }

    #[test]
    fn test_user_rules_do_not_decay() {
        let db = db();
        let cfg = config();
        let id = db
            .learn_alias("OLIVE OIL EV", "olive oil", None, None, RuleSource::User, &cfg)
            .unwrap();
        let before = db.get_alias_rule(id).unwrap().confidence;
        age_rule(&db, id, cfg.inactivity_days + 30);
        db.run_alias_maintenance(&cfg).unwrap();
        let after = db.get_alias_rule(id).unwrap().confidence;
        assert_eq!(before, after);
    }

    #[test]
    fn test_maintenance_boosts_active_rules() {
        let db = db();
        let cfg = config();
        let id = db
            .learn_alias("GROUND BEEF 80 20", "ground beef", None, None, RuleSource::User, &cfg)
            .unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE alias_rules SET hit_count = ?1 WHERE id = ?2",
            params![cfg.boost_min_uses, id],
        )
        .unwrap();
        drop(conn);
        let before = db.get_alias_rule(id).unwrap().confidence;

        let report = db.run_alias_maintenance(&cfg).unwrap();
        assert!(report.boosted >= 1);
        let after = db.get_alias_rule(id).unwrap().confidence;
        assert!(after > before);
        assert!(after <= cfg.confidence_ceiling);
    }

    #[test]
    fn test_prune_deletes_stale_system_rules_only() {
        let db = db();
        let cfg = config();
        let system_id = db
            .upsert_rule("JUNK A", PatternType::Exact, "junk", None, None, RuleSource::System, cfg.confidence_floor, &cfg)
            .unwrap();
        let user_id = db
            .upsert_rule("JUNK B", PatternType::Exact, "junk", None, None, RuleSource::User, cfg.confidence_floor, &cfg)
            .unwrap();
        age_rule(&db, system_id, cfg.prune_min_age_days + 5);
        age_rule(&db, user_id, cfg.prune_min_age_days + 5);

        let report = db.run_alias_maintenance(&cfg).unwrap();
        assert!(report.pruned >= 1);

        assert!(db.get_alias_rule(system_id).is_err());
        // User rules are never deleted by maintenance
        assert!(db.get_alias_rule(user_id).is_ok());
    }

    #[test]
    fn test_young_low_confidence_rules_survive_prune() {
        let db = db();
        let cfg = config();
        let id = db
            .upsert_rule("FRESH GUESS", PatternType::Exact, "unknown", None, None, RuleSource::System, cfg.confidence_floor, &cfg)
            .unwrap();

        db.run_alias_maintenance(&cfg).unwrap();
        assert!(db.get_alias_rule(id).is_ok());
    }

    #[test]
    fn test_regex_rule_matches() {
        let db = db();
        let cfg = config();
        db.upsert_rule(
            r"^MILK \d+ ?PCT",
            PatternType::Regex,
            "milk",
            None,
            None,
            RuleSource::System,
            0.6,
            &cfg,
        )
        .unwrap();

        let resolved = db.resolve_alias("MILK 2 PCT", None, None).unwrap();
        assert_eq!(resolved.unwrap().ingredient_class, "milk");
    }

    #[test]
    fn test_invalid_regex_rule_is_skipped_not_fatal() {
        let db = db();
        let cfg = config();
        db.upsert_rule("([", PatternType::Regex, "broken", None, None, RuleSource::System, 0.6, &cfg)
            .unwrap();
        assert!(db.resolve_alias("ANYTHING", None, None).unwrap().is_none());
    }

    #[test]
    fn test_stats_counts_by_source() {
        let db = db();
        let cfg = config();
        db.learn_alias("ITEM ONE", "one", None, None, RuleSource::User, &cfg).unwrap();
        db.learn_alias("ITEM TWO", "two", None, None, RuleSource::System, &cfg).unwrap();
        db.learn_alias("ITEM THREE", "three", None, Some(7), RuleSource::User, &cfg).unwrap();

        let stats = db.alias_stats(None, &cfg).unwrap();
        assert!(stats.total_rules >= 3);
        assert!(stats.user_rules >= 1);
        assert!(stats.system_rules >= 1);
        assert!(stats.avg_confidence > 0.0);

        let scoped = db.alias_stats(Some(7), &cfg).unwrap();
        assert!(scoped.total_rules < stats.total_rules);
        assert!(scoped.user_rules >= 1);
    }

    #[test]
    fn test_prune_low_confidence_standalone() {
        let db = db();
        let cfg = config();
        let junk = db
            .upsert_rule("JUNK C", PatternType::Exact, "junk", None, None, RuleSource::System, 0.2, &cfg)
            .unwrap();
        let solid = db
            .upsert_rule("SOLID", PatternType::Exact, "solid", None, None, RuleSource::System, 0.6, &cfg)
            .unwrap();
        age_rule(&db, junk, 30);
        age_rule(&db, solid, 30);

        let pruned = db.prune_low_confidence(0.3, 14).unwrap();
        assert_eq!(pruned, 1);
        assert!(db.get_alias_rule(junk).is_err());
        assert!(db.get_alias_rule(solid).is_ok());
    }

    #[test]
    fn test_empty_text_neither_learns_nor_resolves() {
        let db = db();
        assert!(db
            .learn_alias("  ", "milk", None, None, RuleSource::User, &config())
            .is_err());
        assert!(db.resolve_alias("", None, None).unwrap().is_none());
    }

    #[test]
    fn test_delete_rule() {
        let db = db();
        let id = db
            .learn_alias("SODA COLA", "soft drink", None, None, RuleSource::User, &config())
            .unwrap();
        db.delete_alias_rule(id).unwrap();
        assert!(db.get_alias_rule(id).is_err());
    }
}
