//! Store detection and per-store layout profiles
//!
//! Receipt layouts differ per chain: most print the price on the same line
//! as the item, some print the item name with the price and tax marker on
//! the following line, warehouse clubs prefix every item with a long item
//! code. Layout dispatch is a lookup from the detected store to a small
//! enumerated handler, not inheritance.

/// How a store lays out item/price pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemLayout {
    /// Item name and price on one line
    SameLine,
    /// Item name line followed by a bare price (+ tax marker) line
    PriceOnNextLine,
    /// Leading item code of 6+ digits, then name, then price
    CodeFirst,
}

/// A known store chain's receipt profile
#[derive(Debug, Clone)]
pub struct StoreProfile {
    /// Canonical merchant name
    pub name: &'static str,
    /// Uppercase name variants as they appear on receipts
    pub variants: &'static [&'static str],
    pub layout: ItemLayout,
}

/// Known store chains, checked in order
const STORE_PROFILES: &[StoreProfile] = &[
    StoreProfile {
        name: "WALMART",
        variants: &["WALMART", "WAL-MART", "WAL MART", "WM SUPERCENTER"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "TARGET",
        variants: &["TARGET"],
        layout: ItemLayout::PriceOnNextLine,
    },
    StoreProfile {
        name: "COSTCO",
        variants: &["COSTCO", "COSTCO WHOLESALE"],
        layout: ItemLayout::CodeFirst,
    },
    StoreProfile {
        name: "KROGER",
        variants: &["KROGER"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "SAFEWAY",
        variants: &["SAFEWAY"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "ALDI",
        variants: &["ALDI"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "TRADER JOES",
        variants: &["TRADER JOE'S", "TRADER JOES"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "WHOLE FOODS",
        variants: &["WHOLE FOODS", "WHOLEFDS", "WHOLE FOODS MARKET"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "PUBLIX",
        variants: &["PUBLIX"],
        layout: ItemLayout::SameLine,
    },
    StoreProfile {
        name: "SAMS CLUB",
        variants: &["SAM'S CLUB", "SAMS CLUB"],
        layout: ItemLayout::CodeFirst,
    },
];

/// How many leading lines are scanned for a store name
const HEADER_SCAN_LINES: usize = 10;

/// Result of store detection
#[derive(Debug, Clone)]
pub struct DetectedStore {
    /// Merchant name (canonical for known chains, raw header otherwise)
    pub merchant: String,
    pub layout: ItemLayout,
    /// Whether the merchant matched a known profile
    pub known: bool,
}

/// Match the receipt header against the store profile table
///
/// The hint, when present, is checked first. Falls back to the first
/// all-caps line without digits (length 3-30) as an unknown merchant with
/// same-line layout.
pub fn detect_store(lines: &[&str], hint: Option<&str>) -> Option<DetectedStore> {
    if let Some(hint) = hint {
        let hint_upper = hint.to_uppercase();
        for profile in STORE_PROFILES {
            if profile
                .variants
                .iter()
                .any(|v| hint_upper.contains(v) || v.contains(hint_upper.as_str()))
            {
                return Some(DetectedStore {
                    merchant: profile.name.to_string(),
                    layout: profile.layout,
                    known: true,
                });
            }
        }
    }

    for line in lines.iter().take(HEADER_SCAN_LINES) {
        let line_upper = line.trim().to_uppercase();
        if line_upper.is_empty() {
            continue;
        }
        for profile in STORE_PROFILES {
            if profile.variants.iter().any(|v| line_upper.contains(v)) {
                return Some(DetectedStore {
                    merchant: profile.name.to_string(),
                    layout: profile.layout,
                    known: true,
                });
            }
        }
    }

    // Fallback: first all-caps line without digits, plausible name length
    for line in lines.iter().take(HEADER_SCAN_LINES) {
        let trimmed = line.trim();
        let len = trimmed.chars().count();
        if (3..=30).contains(&len)
            && trimmed.chars().any(|c| c.is_ascii_alphabetic())
            && !trimmed.chars().any(|c| c.is_ascii_digit())
            && trimmed == trimmed.to_uppercase()
        {
            return Some(DetectedStore {
                merchant: trimmed.to_string(),
                layout: ItemLayout::SameLine,
                known: false,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_store() {
        let lines = vec!["WALMART", "STORE #1234", "MILK 3.99"];
        let detected = detect_store(&lines, None).unwrap();
        assert_eq!(detected.merchant, "WALMART");
        assert_eq!(detected.layout, ItemLayout::SameLine);
        assert!(detected.known);
    }

    #[test]
    fn test_detect_store_variant() {
        let lines = vec!["WAL-MART SUPERCENTER"];
        let detected = detect_store(&lines, None).unwrap();
        assert_eq!(detected.merchant, "WALMART");
    }

    #[test]
    fn test_detect_code_first_layout() {
        let lines = vec!["COSTCO WHOLESALE", "MEMBER 111222333"];
        let detected = detect_store(&lines, None).unwrap();
        assert_eq!(detected.layout, ItemLayout::CodeFirst);
    }

    #[test]
    fn test_hint_wins() {
        let lines = vec!["SOME HEADER TEXT"];
        let detected = detect_store(&lines, Some("target")).unwrap();
        assert_eq!(detected.merchant, "TARGET");
        assert_eq!(detected.layout, ItemLayout::PriceOnNextLine);
    }

    #[test]
    fn test_fallback_all_caps_line() {
        let lines = vec!["receipt", "JOE'S CORNER MART", "ITEM 1.99"];
        let detected = detect_store(&lines, None).unwrap();
        assert_eq!(detected.merchant, "JOE'S CORNER MART");
        assert!(!detected.known);
        assert_eq!(detected.layout, ItemLayout::SameLine);
    }

    #[test]
    fn test_no_store_detected() {
        let lines = vec!["123456", "7.99"];
        assert!(detect_store(&lines, None).is_none());
    }

    #[test]
    fn test_header_scan_limited_to_ten_lines() {
        let mut lines = vec!["x1"; 12];
        lines.push("WALMART");
        assert!(detect_store(&lines, None).is_none());
    }
}
