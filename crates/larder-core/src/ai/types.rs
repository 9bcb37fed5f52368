//! Wire types for LLM receipt responses
//!
//! The model is asked for decimal dollar amounts; everything is converted
//! to integer cents at the deserialization boundary so no float money
//! escapes into the rest of the pipeline.

use serde::{Deserialize, Deserializer};

/// A receipt as returned by the model, before merging
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmReceipt {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de_money_opt")]
    pub subtotal: Option<i64>,
    #[serde(default, deserialize_with = "de_money_opt")]
    pub tax: Option<i64>,
    #[serde(default, deserialize_with = "de_money_opt")]
    pub total: Option<i64>,
    #[serde(default)]
    pub items: Vec<LlmItem>,
}

/// A line item as returned by the model
#[derive(Debug, Clone, Deserialize)]
pub struct LlmItem {
    pub item_name: String,
    #[serde(deserialize_with = "de_money")]
    pub price: i64,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Accepts a JSON number (dollars) or string ("3.99", "$3.99") and yields cents
fn de_money<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    money_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("not a money amount: {}", value)))
}

fn de_money_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    money_from_value(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("not a money amount: {}", value)))
}

fn money_from_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| (f * 100.0).round() as i64),
        serde_json::Value::String(s) => crate::extract::parse_money(s),
        _ => None,
    }
}
