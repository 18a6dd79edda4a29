use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::PriceBatch;

/// Metadata fields as reported by the metadata API. Every field is optional;
/// the resolver decides the fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HeliusAssetResponse {
    #[serde(default)]
    pub result: Option<AssetResult>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetResult {
    #[serde(default)]
    pub content: Option<AssetContent>,
    #[serde(default)]
    pub token_info: Option<AssetTokenInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetContent {
    #[serde(default)]
    pub metadata: Option<ContentMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetTokenInfo {
    #[serde(default)]
    pub decimals: Option<u8>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<HeliusAssetResponse> for AssetMetadata {
    fn from(response: HeliusAssetResponse) -> Self {
        let result = response.result.unwrap_or_default();
        let metadata = result
            .content
            .and_then(|c| c.metadata)
            .unwrap_or_default();

        AssetMetadata {
            name: non_blank(metadata.name),
            symbol: non_blank(metadata.symbol),
            decimals: result.token_info.and_then(|t| t.decimals),
        }
    }
}

/// Interprets a price API body.
///
/// Accepts either a bare `{mint: {usdPrice}}` map or one wrapped in `data`.
/// A JSON `null` entry is an explicit "no price"; an entry without a usable
/// `usdPrice` is skipped as if it had not been returned.
pub fn parse_price_response(body: &Value) -> PriceBatch {
    let Some(object) = body.as_object() else {
        return PriceBatch::Empty;
    };

    if object.get("status").and_then(Value::as_u64) == Some(429) {
        return PriceBatch::RateLimited;
    }
    if let Some(error) = object.get("error") {
        warn!("Price API returned an error: {}", error);
        return PriceBatch::Empty;
    }

    let entries = match object.get("data").and_then(Value::as_object) {
        Some(data) => data,
        None => object,
    };
    if entries.is_empty() {
        return PriceBatch::Empty;
    }

    let mut prices = HashMap::with_capacity(entries.len());
    for (mint, entry) in entries {
        if entry.is_null() {
            prices.insert(mint.clone(), None);
            continue;
        }

        let price = entry
            .get("usdPrice")
            .or_else(|| entry.get("price"))
            .and_then(|p| match p {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            });

        match price {
            Some(p) if p.is_finite() && p >= 0.0 => {
                prices.insert(mint.clone(), Some(p));
            }
            _ => warn!("Skipping malformed price entry for {}: {}", mint, entry),
        }
    }

    PriceBatch::Prices(prices)
}
