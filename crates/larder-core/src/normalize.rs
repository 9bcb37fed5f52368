//! Token-level text cleanup shared by the extractor and the alias resolver
//!
//! Normalization is a total, deterministic function: any input string maps
//! to a cleaned uppercase form. The pipeline is fixed-table driven — OCR
//! confusion corrections, abbreviation expansion, brand stopword removal —
//! so two runs over the same text always agree.

use std::collections::HashSet;

/// Visually-confusable substitutions OCR engines commonly make on receipt
/// fonts. Applied token-by-token, only to tokens that are mostly digits,
/// so words like "OIL" survive.
const OCR_CONFUSIONS: &[(char, char)] = &[
    ('O', '0'),
    ('o', '0'),
    ('I', '1'),
    ('l', '1'),
    ('S', '5'),
    ('B', '8'),
    ('Z', '2'),
];

/// Unit, size, and category abbreviations expanded token-by-token
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("GAL", "GALLON"),
    ("QT", "QUART"),
    ("PT", "PINT"),
    ("OZ", "OUNCE"),
    ("FLOZ", "FLUID OUNCE"),
    ("LB", "POUND"),
    ("LBS", "POUND"),
    ("PK", "PACK"),
    ("PKG", "PACKAGE"),
    ("CT", "COUNT"),
    ("DZ", "DOZEN"),
    ("EA", "EACH"),
    ("LG", "LARGE"),
    ("MED", "MEDIUM"),
    ("SM", "SMALL"),
    ("WHT", "WHITE"),
    ("WHL", "WHOLE"),
    ("CHKN", "CHICKEN"),
    ("CHIC", "CHICKEN"),
    ("BF", "BEEF"),
    ("GRND", "GROUND"),
    ("BNLS", "BONELESS"),
    ("SKNLS", "SKINLESS"),
    ("VEG", "VEGETABLE"),
    ("FRZ", "FROZEN"),
    ("FRZN", "FROZEN"),
    ("ORG", "ORGANIC"),
    ("CHSE", "CHEESE"),
    ("CHZ", "CHEESE"),
    ("SHRD", "SHREDDED"),
    ("UNSLT", "UNSALTED"),
    ("SWT", "SWEET"),
    ("TOM", "TOMATO"),
    ("POT", "POTATO"),
    ("ONYN", "ONION"),
    ("BTR", "BUTTER"),
    ("MLK", "MILK"),
    ("BRD", "BREAD"),
    ("YOG", "YOGURT"),
    ("YGRT", "YOGURT"),
];

/// Store private-label brands and filler words stripped before matching.
/// Multi-word entries are removed before tokenization.
const BRAND_STOPWORDS_MULTI: &[&str] = &[
    "GREAT VALUE",
    "MARKET PANTRY",
    "GOOD GATHER",
    "SIMPLE TRUTH",
    "PRIVATE SELECTION",
    "365 EVERYDAY VALUE",
    "TRADER JOES",
];

const BRAND_STOPWORDS: &[&str] = &[
    "GV",      // Great Value shelf code
    "KIRKLAND",
    "KROGER",
    "PUBLIX",
    "SIGNATURE",
    "SELECT",
    "BRAND",
    "THE",
    "AND",
    "WITH",
    "FOR",
    "NEW",
];

/// Words too generic to serve as key tokens for alias matching
const TOKEN_STOPWORDS: &[&str] = &[
    "EACH", "PACK", "PACKAGE", "COUNT", "OUNCE", "POUND", "GALLON", "QUART",
    "PINT", "DOZEN", "LARGE", "MEDIUM", "SMALL", "FRESH", "FROZEN", "ORGANIC",
    "WHOLE", "WHITE", "SWEET",
];

/// Minimum character length for a key token
const MIN_TOKEN_LEN: usize = 3;

/// Apply OCR confusion corrections to digit-heavy tokens
///
/// A token qualifies when at least half of its characters are already
/// digits; then letter lookalikes are flipped to the digits they resemble.
pub fn correct_ocr_digits(token: &str) -> String {
    let digit_count = token.chars().filter(|c| c.is_ascii_digit()).count();
    if token.is_empty() || digit_count * 2 < token.len() {
        return token.to_string();
    }

    token
        .chars()
        .map(|c| {
            OCR_CONFUSIONS
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

/// Apply digit corrections token-wise across a whole receipt line
///
/// Run before price and date extraction so that a confused price token
/// like `3.9O` is readable by the digit-only patterns downstream.
pub fn correct_line_digits(line: &str) -> String {
    line.split_whitespace()
        .map(correct_ocr_digits)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize raw item text for matching
///
/// Uppercase, strip punctuation (space and hyphen survive), correct OCR
/// digit confusions, expand abbreviations, drop brand stopwords, collapse
/// whitespace. Total function — never fails, empty in gives empty out.
pub fn normalize(text: &str) -> String {
    let mut upper = text.to_uppercase();

    // Multi-word brand labels go first, before tokenization splits them
    for brand in BRAND_STOPWORDS_MULTI {
        if upper.contains(brand) {
            upper = upper.replace(brand, " ");
        }
    }

    let cleaned: String = upper
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .map(correct_ocr_digits)
        .map(|t| expand_abbreviation(&t))
        .filter(|t| !BRAND_STOPWORDS.contains(&t.as_str()))
        .collect();

    tokens.join(" ")
}

fn expand_abbreviation(token: &str) -> String {
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, full)| full.to_string())
        .unwrap_or_else(|| token.to_string())
}

/// Extract the tokens worth matching on: stopword-filtered, minimum length
pub fn extract_key_tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .filter(|t| !TOKEN_STOPWORDS.contains(t))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.to_string())
        .collect()
}

/// The longest key token, used for token-level alias rules
pub fn dominant_token(text: &str) -> Option<String> {
    extract_key_tokens(text)
        .into_iter()
        .max_by_key(|t| t.len())
}

/// Jaccard similarity over key tokens, in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = extract_key_tokens(a).into_iter().collect();
    let set_b: HashSet<String> = extract_key_tokens(b).into_iter().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}
