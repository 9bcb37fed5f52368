//! JSON extraction from LLM responses
//!
//! Model responses often wrap the JSON payload in prose or code fences;
//! these helpers find the outermost object and deserialize it.

use crate::error::{Error, Result};

use super::types::LlmReceipt;

/// Parse a receipt from a raw model response
pub fn parse_receipt_response(response: &str) -> Result<LlmReceipt> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid receipt JSON from model: {} | Raw: {}",
                    e,
                    truncate(json_str)
                ))
            })
        }
        _ => Err(Error::InvalidData(format!(
            "No JSON found in model response | Raw: {}",
            truncate(response)
        ))),
    }
}

fn truncate(s: &str) -> String {
    if s.len() > 200 {
        let mut end = 200;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_json() {
        let receipt =
            parse_receipt_response(r#"{"merchant": "TARGET", "total": 10.00, "items": []}"#)
                .unwrap();
        assert_eq!(receipt.merchant.as_deref(), Some("TARGET"));
        assert_eq!(receipt.total, Some(1000));
    }

    #[test]
    fn test_parses_json_wrapped_in_prose() {
        let response = "Here is the parsed receipt:\n```json\n{\"merchant\": \"ALDI\", \"items\": []}\n```\nLet me know if you need anything else.";
        let receipt = parse_receipt_response(response).unwrap();
        assert_eq!(receipt.merchant.as_deref(), Some("ALDI"));
    }

    #[test]
    fn test_no_json_is_an_error() {
        assert!(parse_receipt_response("I could not parse this receipt.").is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_receipt_response(r#"{"merchant": WALMART}"#).is_err());
    }
}
