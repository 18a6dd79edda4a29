use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most recently fetched USD unit price for a mint.
///
/// Quotes are immutable; a refresh builds a new quote and swaps it into the
/// owning [`Token`](super::Token).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub mint: String,
    pub usd_price: f64,
    pub updated_at: DateTime<Utc>,
}

impl MarketQuote {
    pub fn new(mint: impl Into<String>, usd_price: f64) -> Self {
        Self {
            mint: mint.into(),
            usd_price,
            updated_at: Utc::now(),
        }
    }
}
