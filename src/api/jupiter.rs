use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::types::parse_price_response;
use super::{PriceApi, PriceBatch};
use crate::error::{Error, Result};

pub const DEFAULT_JUPITER_PRICE_URL: &str = "https://lite-api.jup.ag/price/v3";

/// Jupiter price API client. One request prices a comma separated batch of mints.
#[derive(Debug, Clone)]
pub struct JupiterPriceClient {
    client: Client,
    base_url: String,
}

impl JupiterPriceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PriceApi for JupiterPriceClient {
    async fn get_prices(&self, mints: &[String]) -> Result<PriceBatch> {
        if mints.is_empty() {
            return Ok(PriceBatch::Empty);
        }

        let url = format!("{}?ids={}", self.base_url, mints.join(","));
        debug!("Requesting prices for {} mints", mints.len());
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limit exceeded for Jupiter price API");
                Ok(PriceBatch::RateLimited)
            }
            status if status.is_success() => {
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Ok(PriceBatch::Empty);
                }
                let body: Value = serde_json::from_str(&text)?;
                Ok(parse_price_response(&body))
            }
            status => {
                let error_msg = format!("Price request failed with status: {}", status);
                error!("{}", error_msg);
                Err(Error::ApiError(error_msg))
            }
        }
    }
}
