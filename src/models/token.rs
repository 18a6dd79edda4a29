use parking_lot::RwLock;
use std::sync::Arc;

use super::MarketQuote;

pub const UNKNOWN_TOKEN_NAME: &str = "Unknown Token";
pub const UNKNOWN_TOKEN_SYMBOL: &str = "Unknown Symbol";

/// Fungible token metadata plus its current quote.
///
/// Tokens are shared as `Arc<Token>`: every position holding the same mint sees
/// the same instance, so a quote swap is visible to all of them at once.
/// Identity fields never change after construction.
#[derive(Debug)]
pub struct Token {
    mint: String,
    name: String,
    symbol: String,
    decimals: u8,
    quote: RwLock<Option<Arc<MarketQuote>>>,
}

impl Token {
    pub fn new(
        mint: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            mint: mint.into(),
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            quote: RwLock::new(None),
        }
    }

    /// Placeholder for a mint whose metadata could not be resolved.
    pub fn unknown(mint: impl Into<String>) -> Self {
        Self::new(mint, UNKNOWN_TOKEN_NAME, UNKNOWN_TOKEN_SYMBOL, 0)
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_TOKEN_NAME
    }

    pub fn mint(&self) -> &str {
        &self.mint
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn quote(&self) -> Option<Arc<MarketQuote>> {
        self.quote.read().clone()
    }

    pub fn usd_price(&self) -> Option<f64> {
        self.quote.read().as_ref().map(|q| q.usd_price)
    }

    /// Swaps in a new quote and returns the previous one.
    pub fn set_quote(&self, quote: MarketQuote) -> Option<Arc<MarketQuote>> {
        self.quote.write().replace(Arc::new(quote))
    }

    /// Raw on-chain amount scaled by this token's decimal precision.
    pub fn to_native(&self, raw_amount: u64) -> f64 {
        raw_amount as f64 / 10f64.powi(self.decimals as i32)
    }
}
