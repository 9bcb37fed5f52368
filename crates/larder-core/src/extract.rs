//! Heuristic receipt extractor
//!
//! Pattern-driven parser that turns raw OCR text into a `ParsedReceipt`
//! with per-item and overall confidence plus a reconciliation verdict.
//! Malformed input is never fatal: the worst case is an empty receipt with
//! low confidence and `reconciliation_ok = false`.

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::models::{ParseSource, ParsedLineItem, ParsedReceipt};
use crate::normalize::{correct_line_digits, correct_ocr_digits};
use crate::stores::{detect_store, DetectedStore, ItemLayout};

/// Overall-confidence contribution of extracted metadata
const CONF_MERCHANT: f64 = 0.15;
const CONF_DATE: f64 = 0.10;
const CONF_TOTAL: f64 = 0.05;

/// Overall-confidence contribution of priced items, stepped by count
const ITEM_CONF_STEPS: &[(usize, f64)] = &[(10, 0.70), (5, 0.65), (3, 0.60), (1, 0.55)];

/// Ceiling when no priced items were found at all
const NO_ITEMS_CONF_CAP: f64 = 0.30;

/// Per-item confidence ladder
const ITEM_BASE_CONF: f64 = 0.5;
const ITEM_CONF_CAP: f64 = 0.95;

/// Plausible price band for a single grocery item, in cents
const PRICE_PLAUSIBLE: std::ops::RangeInclusive<i64> = 10..=50_000;

/// Tax rates probed during last-resort reconciliation
const PROBE_TAX_RATES: &[f64] = &[0.0, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08, 0.09, 0.10];

/// Lines matching any of these are never item candidates
const SKIP_KEYWORDS: &[&str] = &[
    "LOYALTY",
    "POINTS",
    "MEMBER",
    "REWARD",
    "THANK YOU",
    "CASHIER",
    "REGISTER",
    "CHANGE DUE",
    "CASH TEND",
    "DEBIT",
    "CREDIT",
    "VISA",
    "MASTERCARD",
    "AMEX",
    "APPROVED",
    "AUTH CODE",
    "RETURN POLICY",
    "SURVEY",
];

/// Totals keyword families. Exclusions are checked before any family.
const TOTAL_EXCLUSIONS: &[&str] = &[
    "TOTAL POINTS",
    "POINTS BALANCE",
    "REWARDS BALANCE",
    "TOTAL ITEMS",
    "TOTAL SAVED ITEMS",
];
const SUBTOTAL_KEYWORDS: &[&str] = &["SUBTOTAL", "SUB TOTAL", "SUB-TOTAL"];
const TAX_KEYWORDS: &[&str] = &["TAX", "HST", "GST"];
const SAVINGS_KEYWORDS: &[&str] = &["SAVINGS", "YOU SAVED", "DISCOUNT"];
const TOTAL_KEYWORDS: &[&str] = &["TOTAL", "BALANCE DUE", "AMOUNT DUE"];

/// Ingredient category keywords for per-item confidence
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("dairy", &["MILK", "CHEESE", "YOGURT", "BUTTER", "CREAM", "EGG"]),
    ("bakery", &["BREAD", "BAGEL", "BUN", "ROLL", "TORTILLA", "MUFFIN"]),
    ("meat", &["CHICKEN", "CHKN", "BEEF", "PORK", "TURKEY", "HAM", "BACON", "SAUSAGE"]),
    ("seafood", &["SALMON", "TUNA", "SHRIMP", "TILAPIA", "COD"]),
    (
        "produce",
        &[
            "APPLE", "BANANA", "ORANGE", "GRAPE", "LETTUCE", "TOMATO", "ONION", "POTATO",
            "CARROT", "PEPPER", "BROCCOLI", "SPINACH", "AVOCADO",
        ],
    ),
    ("pantry", &["RICE", "PASTA", "FLOUR", "SUGAR", "CEREAL", "BEANS", "SOUP", "OIL"]),
    ("frozen", &["FROZEN", "PIZZA", "ICE CREAM"]),
    ("beverage", &["JUICE", "SODA", "WATER", "COFFEE", "TEA"]),
];

/// What a totals line classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TotalKind {
    Subtotal,
    Tax,
    Savings,
    Total,
}

/// Store-aware heuristic extractor
///
/// Regexes are compiled once in the constructor; the extractor is cheap to
/// share across parses.
pub struct HeuristicExtractor {
    config: ExtractorConfig,
    /// Trailing decimal money token, optionally negative or tax-flagged
    trailing_price_re: Regex,
    /// A line that is nothing but a price (plus optional tax flag)
    bare_price_re: Regex,
    /// Leading small integer quantity token
    leading_qty_re: Regex,
    /// Leading item code run of 6+ digits
    leading_code_re: Regex,
    /// `<qty> LB|KG|OZ @ <unit price>` weight sub-pattern
    weight_re: Regex,
    /// Labeled store number
    store_num_re: Regex,
    /// Date format patterns, tried in order; first match wins
    date_res: Vec<(Regex, DateOrder)>,
    /// HH:MM[:SS][AM/PM]
    time_re: Regex,
    /// 8+ consecutive digits (barcodes, card numbers)
    long_digits_re: Regex,
    /// Phone number, a skip-list signal
    phone_re: Regex,
    /// Separator line (***, ---, ===)
    separator_re: Regex,
}

/// Field order of a matched date pattern
#[derive(Debug, Clone, Copy)]
enum DateOrder {
    YearMonthDay,
    MonthDayYear,
    MonthDayYearShort,
}

impl HeuristicExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            trailing_price_re: Regex::new(r"(-?\$?\d{1,4}[.,]\d{2})\s*-?\s*[A-Z]?\s*$")
                .expect("valid regex"),
            bare_price_re: Regex::new(r"^\s*\$?(\d{1,4}[.,]\d{2})\s*[A-Z]?\s*$")
                .expect("valid regex"),
            leading_qty_re: Regex::new(r"^\s*(\d{1,2})\s+").expect("valid regex"),
            leading_code_re: Regex::new(r"^\s*(\d{6,})\s+").expect("valid regex"),
            weight_re: Regex::new(r"(\d+(?:\.\d+)?)\s*(LB|KG|OZ)\s*@\s*\$?(\d{1,4}\.\d{2})")
                .expect("valid regex"),
            store_num_re: Regex::new(r"(?:STORE|STR|ST)\s*#?\s*(\d{1,6})\b")
                .expect("valid regex"),
            date_res: vec![
                (
                    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"),
                    DateOrder::YearMonthDay,
                ),
                (
                    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"),
                    DateOrder::MonthDayYear,
                ),
                (
                    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2})\b").expect("valid regex"),
                    DateOrder::MonthDayYearShort,
                ),
                (
                    Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").expect("valid regex"),
                    DateOrder::MonthDayYear,
                ),
            ],
            time_re: Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(AM|PM)?\b")
                .expect("valid regex"),
            long_digits_re: Regex::new(r"\d{8,}").expect("valid regex"),
            phone_re: Regex::new(r"\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}").expect("valid regex"),
            separator_re: Regex::new(r"^[\*\-=_#]{3,}$").expect("valid regex"),
        }
    }

    /// Parse raw OCR text into a structured receipt
    ///
    /// Total function: any input yields a receipt, possibly empty and
    /// low-confidence. `store_hint` short-circuits store detection.
    pub fn parse(&self, text: &str, store_hint: Option<&str>) -> ParsedReceipt {
        let mut receipt = ParsedReceipt {
            content_hash: content_hash(text),
            source: ParseSource::Heuristics,
            ..Default::default()
        };

        let lines: Vec<String> = text
            .lines()
            .map(|l| correct_line_digits(&l.trim().to_uppercase()))
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return receipt;
        }
        let line_refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        // Store detection drives merchant and layout dispatch
        let detected = detect_store(&line_refs, store_hint);
        let layout = detected
            .as_ref()
            .map(|d| d.layout)
            .unwrap_or(ItemLayout::SameLine);
        receipt.merchant = detected.as_ref().map(|d| d.merchant.clone());

        self.extract_metadata(&lines, &mut receipt);
        let content_line_count = self.extract_totals_and_items(&lines, layout, &detected, &mut receipt);

        receipt.lines_paired_ratio = if content_line_count == 0 {
            0.0
        } else {
            (receipt.items.len() as f64 / content_line_count as f64).min(1.0)
        };

        receipt.reconciliation_ok = self.reconcile(&receipt);
        receipt.confidence = self.overall_confidence(&receipt);

        debug!(
            merchant = ?receipt.merchant,
            items = receipt.items.len(),
            confidence = receipt.confidence,
            reconciled = receipt.reconciliation_ok,
            "heuristic parse complete"
        );

        receipt
    }

    fn extract_metadata(&self, lines: &[String], receipt: &mut ParsedReceipt) {
        for line in lines {
            if receipt.store_id.is_none() {
                if let Some(caps) = self.store_num_re.captures(line) {
                    receipt.store_id = Some(caps[1].to_string());
                }
            }

            if receipt.date.is_none() {
                for (re, order) in &self.date_res {
                    if let Some(caps) = re.captures(line) {
                        if let Some(iso) = normalize_date(&caps, *order) {
                            receipt.date = Some(iso);
                            break;
                        }
                    }
                }
            }

            if receipt.time.is_none() {
                if let Some(caps) = self.time_re.captures(line) {
                    receipt.time = normalize_time(&caps);
                }
            }
        }
    }

    /// Classify totals lines and extract items; returns the count of
    /// content lines that were eligible for item pairing
    fn extract_totals_and_items(
        &self,
        lines: &[String],
        layout: ItemLayout,
        detected: &Option<DetectedStore>,
        receipt: &mut ParsedReceipt,
    ) -> usize {
        let mut content_lines = 0usize;
        // Buffered candidate name for price-on-next-line layouts
        let mut pending_name: Option<String> = None;

        for line in lines {
            if let Some(kind) = classify_total_line(line) {
                if let Some(cents) = self.last_money_token(line) {
                    match kind {
                        TotalKind::Subtotal => receipt.subtotal_cents = cents,
                        TotalKind::Tax => receipt.tax_cents = cents,
                        TotalKind::Savings => receipt.savings_cents = cents.abs(),
                        TotalKind::Total => receipt.total_cents = cents,
                    }
                }
                pending_name = None;
                continue;
            }

            if self.is_skippable(line) {
                pending_name = None;
                continue;
            }

            // Header line already consumed as the merchant
            if let Some(d) = detected {
                if d.known && line.contains(d.merchant.as_str()) {
                    continue;
                }
            }

            content_lines += 1;

            match layout {
                ItemLayout::SameLine => {
                    if let Some(item) = self.extract_same_line_item(line) {
                        receipt.items.push(item);
                    }
                }
                ItemLayout::PriceOnNextLine => {
                    if let Some(caps) = self.bare_price_re.captures(line) {
                        if let Some(name) = pending_name.take() {
                            if let Some(cents) = parse_money(&caps[1]) {
                                let raw = format!("{} {}", name, line);
                                receipt.items.push(self.build_item(&raw, &name, cents));
                            }
                        }
                    } else if self.trailing_price_re.is_match(line) {
                        // Some lines still carry inline prices even in this
                        // layout (weighed goods); handle them directly
                        if let Some(item) = self.extract_same_line_item(line) {
                            receipt.items.push(item);
                        }
                        pending_name = None;
                    } else {
                        // Unattached trailing names are dropped at end of scan
                        pending_name = Some(line.clone());
                    }
                }
                ItemLayout::CodeFirst => {
                    let stripped = self.leading_code_re.replace(line, "");
                    if let Some(item) = self.extract_same_line_item(&stripped) {
                        receipt.items.push(item);
                    }
                }
            }
        }

        content_lines
    }

    /// Same-line extraction: trailing money token marks the price, the text
    /// before it (minus a leading quantity) is the name
    fn extract_same_line_item(&self, line: &str) -> Option<ParsedLineItem> {
        let caps = self.trailing_price_re.captures(line)?;
        let price_match = caps.get(1)?;
        let cents = parse_money(price_match.as_str())?;
        if cents <= 0 {
            return None;
        }

        let mut name_part = line[..price_match.start()].trim().to_string();
        let mut quantity = 1.0;
        let mut unit = "EA".to_string();

        // Weight sub-pattern overrides quantity/unit and cleans the name
        if let Some(wcaps) = self.weight_re.captures(line) {
            quantity = wcaps[1].parse().unwrap_or(1.0);
            unit = wcaps[2].to_string();
            if let Some(m) = self.weight_re.find(&name_part) {
                name_part = name_part[..m.start()].trim().to_string();
            }
        } else if let Some(qcaps) = self.leading_qty_re.captures(&name_part) {
            quantity = qcaps[1].parse().unwrap_or(1.0);
            name_part = self.leading_qty_re.replace(&name_part, "").to_string();
        }

        let name = name_part.trim().trim_end_matches('-').trim();
        if name.is_empty() || !name.chars().any(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let mut item = self.build_item(line, name, cents);
        item.quantity = quantity;
        item.unit = unit;
        Some(item)
    }

    fn build_item(&self, raw: &str, name: &str, cents: i64) -> ParsedLineItem {
        let mut item = ParsedLineItem::new(raw, name, cents);
        item.category = category_for(name).map(|c| c.to_string());
        item.confidence = self.item_confidence(&item);
        item
    }

    /// Per-item confidence ladder, capped at 0.95
    fn item_confidence(&self, item: &ParsedLineItem) -> f64 {
        let mut conf = ITEM_BASE_CONF;

        let name_len = item.item_name.chars().count();
        if (3..=40).contains(&name_len) {
            conf += 0.10;
        }
        if item.item_name.chars().any(|c| c.is_ascii_alphabetic()) {
            conf += 0.10;
        }
        if PRICE_PLAUSIBLE.contains(&item.price_cents) {
            conf += 0.10;
        }
        if item.category.is_some() {
            conf += 0.15;
        }
        if !self.long_digits_re.is_match(&item.raw_text) {
            conf += 0.05;
        }

        conf.min(ITEM_CONF_CAP)
    }

    /// Metadata portion (up to 0.30) plus item portion (up to 0.70)
    fn overall_confidence(&self, receipt: &ParsedReceipt) -> f64 {
        let mut conf = 0.0;
        if receipt.merchant.is_some() {
            conf += CONF_MERCHANT;
        }
        if receipt.date.is_some() {
            conf += CONF_DATE;
        }
        if receipt.total_cents > 0 {
            conf += CONF_TOTAL;
        }

        let priced = receipt.priced_item_count();
        if priced == 0 {
            return conf.min(NO_ITEMS_CONF_CAP);
        }

        for (threshold, value) in ITEM_CONF_STEPS {
            if priced >= *threshold {
                conf += value;
                break;
            }
        }

        conf.min(1.0)
    }

    /// Arithmetic reconciliation of item sums against posted totals
    ///
    /// Tolerance is max(cents floor, percentage of the compared amount).
    /// The tax-rate probe accepts if any plausible rate fits within a
    /// looser (2x) band; intentionally permissive, see DESIGN.md.
    pub(crate) fn reconcile(&self, receipt: &ParsedReceipt) -> bool {
        let item_sum = receipt.item_sum_cents();
        if item_sum == 0 {
            return false;
        }

        if receipt.subtotal_cents > 0
            && (item_sum - receipt.subtotal_cents).abs() <= self.tolerance(receipt.subtotal_cents)
        {
            return true;
        }

        if receipt.total_cents > 0
            && (item_sum + receipt.tax_cents - receipt.total_cents).abs()
                <= self.tolerance(receipt.total_cents)
        {
            return true;
        }

        if receipt.total_cents > 0 {
            let loose = self.tolerance(receipt.total_cents) * 2;
            for rate in PROBE_TAX_RATES {
                let implied = (item_sum as f64 * (1.0 + rate)).round() as i64;
                if (implied - receipt.total_cents).abs() <= loose {
                    return true;
                }
            }
        }

        false
    }

    fn tolerance(&self, amount_cents: i64) -> i64 {
        let pct = (amount_cents as f64 * self.config.tolerance_percent).round() as i64;
        pct.max(self.config.tolerance_floor_cents)
    }

    fn is_skippable(&self, line: &str) -> bool {
        if self.separator_re.is_match(line) || self.phone_re.is_match(line) {
            return true;
        }
        // A line that is nothing but a long digit run is a barcode
        if line.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
            && self.long_digits_re.is_match(line)
        {
            return true;
        }
        SKIP_KEYWORDS.iter().any(|k| line.contains(k))
    }

    /// Extract the last decimal-money token on a line, in cents
    fn last_money_token(&self, line: &str) -> Option<i64> {
        let caps = self.trailing_price_re.captures(line)?;
        parse_money(caps.get(1)?.as_str())
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// SHA-256 of the raw OCR text, hex encoded
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse a decimal money token into integer cents
///
/// Strips currency symbols, accepts `,` as a decimal separator (a frequent
/// OCR substitution), and applies digit-confusion correction. Money never
/// passes through floating point.
pub fn parse_money(token: &str) -> Option<i64> {
    let negative = token.contains('-');
    let cleaned: String = token
        .chars()
        .filter(|c| !matches!(c, '$' | '-' | ' '))
        .collect();
    let cleaned = cleaned.replace(',', ".");

    let (whole, frac) = cleaned.rsplit_once('.')?;
    if frac.len() != 2 {
        return None;
    }
    let whole = correct_ocr_digits(whole);
    let frac = correct_ocr_digits(frac);

    let dollars: i64 = whole.parse().ok()?;
    let cents: i64 = frac.parse().ok()?;
    let value = dollars * 100 + cents;
    Some(if negative { -value } else { value })
}

/// Classify a line by totals keyword family, honoring the exclusion list
fn classify_total_line(line: &str) -> Option<TotalKind> {
    if TOTAL_EXCLUSIONS.iter().any(|e| line.contains(e)) {
        return None;
    }
    if SUBTOTAL_KEYWORDS.iter().any(|k| line.contains(k)) {
        return Some(TotalKind::Subtotal);
    }
    if TAX_KEYWORDS.iter().any(|k| line.contains(k)) {
        return Some(TotalKind::Tax);
    }
    if SAVINGS_KEYWORDS.iter().any(|k| line.contains(k)) {
        return Some(TotalKind::Savings);
    }
    if TOTAL_KEYWORDS.iter().any(|k| line.contains(k)) {
        return Some(TotalKind::Total);
    }
    None
}

/// Ingredient category for a recognized keyword in the item name
pub fn category_for(name: &str) -> Option<&'static str> {
    let upper = name.to_uppercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| upper.contains(k)) {
            return Some(category);
        }
    }
    None
}

fn normalize_date(caps: &regex::Captures<'_>, order: DateOrder) -> Option<String> {
    let (year, month, day) = match order {
        DateOrder::YearMonthDay => (
            caps[1].parse::<i32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps[3].parse::<u32>().ok()?,
        ),
        DateOrder::MonthDayYear => (
            caps[3].parse::<i32>().ok()?,
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
        ),
        DateOrder::MonthDayYearShort => (
            2000 + caps[3].parse::<i32>().ok()?,
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
        ),
    };

    // Validates the calendar date, rejecting things like 13/45/2024
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn normalize_time(caps: &regex::Captures<'_>) -> Option<String> {
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second: Option<u32> = caps.get(3).and_then(|m| m.as_str().parse().ok());

    match caps.get(4).map(|m| m.as_str()) {
        Some("PM") if hour < 12 => hour += 12,
        Some("AM") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }

    Some(match second {
        Some(s) if s <= 59 => format!("{:02}:{:02}:{:02}", hour, minute, s),
        _ => format!("{:02}:{:02}", hour, minute),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> HeuristicExtractor {
        HeuristicExtractor::default()
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("3.99"), Some(399));
        assert_eq!(parse_money("$12.50"), Some(1250));
        assert_eq!(parse_money("3,99"), Some(399));
        assert_eq!(parse_money("-2.00"), Some(-200));
        assert_eq!(parse_money("abc"), None);
        assert_eq!(parse_money("3.9"), None);
    }

    #[test]
    fn test_parse_money_ocr_confusion() {
        // OCR read the zero as the letter O
        assert_eq!(parse_money("1O.5O"), Some(1050));
    }

    #[test]
    fn test_confused_price_digits_corrected_before_item_extraction() {
        // The trailing-price pattern only sees digits, so the line-level
        // correction must run first or this item is lost entirely
        let receipt = extractor().parse("WALMART\nMILK 3.9O\nTOTAL 3.90", None);
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].price_cents, 390);
    }

    #[test]
    fn test_empty_input_degrades() {
        let receipt = extractor().parse("", None);
        assert!(receipt.items.is_empty());
        assert_eq!(receipt.confidence, 0.0);
        assert!(!receipt.reconciliation_ok);
    }

    #[test]
    fn test_garbage_input_never_panics() {
        let receipt = extractor().parse("$$$$\n\u{1F600}\n????\n12", None);
        assert!(receipt.confidence <= NO_ITEMS_CONF_CAP);
    }

    #[test]
    fn test_walmart_end_to_end() {
        let text = "WALMART\nMILK 2% GAL 3.99\nBREAD 2.49\nSUBTOTAL 6.48\nTAX 0.45\nTOTAL 6.93";
        let receipt = extractor().parse(text, None);

        assert_eq!(receipt.merchant.as_deref(), Some("WALMART"));
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].item_name, "MILK 2% GAL");
        assert_eq!(receipt.items[0].price_cents, 399);
        assert_eq!(receipt.items[1].item_name, "BREAD");
        assert_eq!(receipt.items[1].price_cents, 249);
        assert_eq!(receipt.subtotal_cents, 648);
        assert_eq!(receipt.tax_cents, 45);
        assert_eq!(receipt.total_cents, 693);
        assert!(receipt.reconciliation_ok);
        // merchant 0.15 + total 0.05 + items 0.55
        assert!((receipt.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_date_extraction_first_match_wins() {
        let text = "KROGER\n01/15/2024 14:32\nMILK 3.49";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.date.as_deref(), Some("2024-01-15"));
        assert_eq!(receipt.time.as_deref(), Some("14:32"));
    }

    #[test]
    fn test_invalid_calendar_date_rejected() {
        let text = "KROGER\n13/45/2024\nMILK 3.49";
        let receipt = extractor().parse(text, None);
        assert!(receipt.date.is_none());
    }

    #[test]
    fn test_store_number_extraction() {
        let text = "WALMART\nSTORE #2310\nMILK 3.99";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.store_id.as_deref(), Some("2310"));
    }

    #[test]
    fn test_total_exclusions() {
        let text = "KROGER\nMILK 3.99\nTOTAL POINTS 452.00\nTOTAL 3.99";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.total_cents, 399);
    }

    #[test]
    fn test_weight_pattern_overrides_quantity() {
        let text = "KROGER\nBANANAS 2.5 LB @ 0.59 1.48";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.items.len(), 1);
        let item = &receipt.items[0];
        assert_eq!(item.item_name, "BANANAS");
        assert_eq!(item.quantity, 2.5);
        assert_eq!(item.unit, "LB");
        assert_eq!(item.price_cents, 148);
    }

    #[test]
    fn test_leading_quantity_stripped() {
        let text = "KROGER\n2 YOGURT CUPS 4.00";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].item_name, "YOGURT CUPS");
        assert_eq!(receipt.items[0].quantity, 2.0);
    }

    #[test]
    fn test_price_on_next_line_layout() {
        let text = "TARGET\nMILK 2% GALLON\n3.99 T\nSHREDDED CHEESE\n4.29 T\nORPHAN NAME\nTOTAL 8.28";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].item_name, "MILK 2% GALLON");
        assert_eq!(receipt.items[0].price_cents, 399);
        assert_eq!(receipt.items[1].item_name, "SHREDDED CHEESE");
        // Unattached trailing name is dropped
        assert!(receipt.items.iter().all(|i| i.item_name != "ORPHAN NAME"));
    }

    #[test]
    fn test_code_first_layout() {
        let text = "COSTCO WHOLESALE\n9482761 ROTISSERIE CHICKEN 4.99\n1203944 PAPER TOWELS 18.99";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].item_name, "ROTISSERIE CHICKEN");
        assert_eq!(receipt.items[0].price_cents, 499);
        assert_eq!(receipt.items[1].item_name, "PAPER TOWELS");
    }

    #[test]
    fn test_skip_list_discards_noise() {
        let text = "KROGER\nMILK 3.99\nLOYALTY POINTS EARNED 12.00\n(555) 123-4567\n************\n123456789012";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.items.len(), 1);
    }

    #[test]
    fn test_reconciliation_within_tolerance() {
        // Items sum to $31.72 against a posted subtotal of $32.00:
        // diff 28c, band max(50c, 5% of 3200 = 160c) — reconciles
        let text = "KROGER\nITEM A 15.86\nITEM B 15.86\nSUBTOTAL 32.00";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.item_sum_cents(), 3172);
        assert!(receipt.reconciliation_ok);
    }

    #[test]
    fn test_reconciliation_fails_outside_tolerance() {
        let text = "KROGER\nITEM A 10.00\nITEM B 10.00\nSUBTOTAL 32.00";
        let receipt = extractor().parse(text, None);
        assert_eq!(receipt.item_sum_cents(), 2000);
        assert!(!receipt.reconciliation_ok);
    }

    #[test]
    fn test_reconciliation_tax_rate_probe() {
        // No subtotal printed; items * 1.07 matches the grand total
        let text = "KROGER\nITEM A 10.00\nITEM B 10.00\nTOTAL 21.40";
        let receipt = extractor().parse(text, None);
        assert!(receipt.reconciliation_ok);
    }

    #[test]
    fn test_confidence_monotonic_in_items() {
        let base = "KROGER\n01/15/2024\n";
        let mut last = 0.0;
        for n in [1usize, 3, 5, 10] {
            let mut text = base.to_string();
            for i in 0..n {
                text.push_str(&format!("MILK ITEM {} 2.00\n", i));
            }
            let receipt = extractor().parse(&text, None);
            assert!(
                receipt.confidence >= last,
                "confidence decreased at {} items",
                n
            );
            last = receipt.confidence;
        }
    }

    #[test]
    fn test_no_priced_items_caps_confidence() {
        let text = "WALMART\n01/15/2024\nTOTAL 10.00";
        let receipt = extractor().parse(text, None);
        assert!(receipt.priced_item_count() == 0);
        assert!(receipt.confidence <= NO_ITEMS_CONF_CAP);
    }

    #[test]
    fn test_item_confidence_category_boost() {
        let ex = extractor();
        let with_category = ex.build_item("MILK 3.99", "MILK", 399);
        let without = ex.build_item("WIDGET 3.99", "WIDGET", 399);
        assert!(with_category.confidence > without.confidence);
        assert!(with_category.confidence <= ITEM_CONF_CAP);
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
