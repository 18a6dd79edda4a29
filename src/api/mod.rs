use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::collections::HashMap;

use crate::error::Result;

pub mod helius;
pub mod jupiter;
pub mod types;

pub use helius::HeliusClient;
pub use jupiter::JupiterPriceClient;
pub use types::AssetMetadata;

/// Result of one batched price lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceBatch {
    /// Per-mint prices. `None` means the API explicitly returned no price.
    /// Mints missing from the map were simply not returned.
    Prices(HashMap<String, Option<f64>>),
    /// The whole request was rejected by the remote rate limiter.
    RateLimited,
    /// No usable body at all.
    Empty,
}

/// Token metadata lookup, one mint per request.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn get_asset_metadata(&self, mint: &str) -> Result<AssetMetadata>;
}

/// Batched USD price lookup.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceApi: Send + Sync {
    async fn get_prices(&self, mints: &[String]) -> Result<PriceBatch>;
}
