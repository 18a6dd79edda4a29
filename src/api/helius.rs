use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

use super::types::{AssetMetadata, HeliusAssetResponse};
use super::MetadataApi;
use crate::error::{Error, Result};

pub const DEFAULT_HELIUS_URL: &str = "https://mainnet.helius-rpc.com";

/// Helius DAS `getAsset` client used for token metadata.
#[derive(Debug, Clone)]
pub struct HeliusClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HeliusClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        if self.api_key.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/?api-key={}", self.base_url.trim_end_matches('/'), self.api_key)
        }
    }
}

#[async_trait]
impl MetadataApi for HeliusClient {
    async fn get_asset_metadata(&self, mint: &str) -> Result<AssetMetadata> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "wallet-tracker",
            "method": "getAsset",
            "params": {
                "id": mint,
                "displayOptions": { "showFungible": true }
            }
        });

        debug!("Requesting asset metadata for {}", mint);
        let response = self.client.post(self.endpoint()).json(&payload).send().await?;

        match response.status() {
            status if status.is_success() => {
                let body: HeliusAssetResponse = response.json().await.map_err(|e| {
                    Error::ApiInvalidFormat(format!("Failed to parse asset response for {}: {}", mint, e))
                })?;
                if let Some(err) = &body.error {
                    warn!("Metadata API returned an error for {}: {}", mint, err);
                    return Err(Error::ApiError(format!("getAsset failed for {}: {}", mint, err)));
                }
                Ok(body.into())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimitExceeded(
                "Helius API rate limit exceeded".to_string(),
            )),
            status => {
                let error_msg = format!("Helius request for {} failed with status: {}", mint, status);
                error!("{}", error_msg);
                Err(Error::ApiError(error_msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_api_key() {
        let client = HeliusClient::new(DEFAULT_HELIUS_URL, "secret", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "https://mainnet.helius-rpc.com/?api-key=secret");

        let keyless = HeliusClient::new("http://localhost:8899", "", Duration::from_secs(5)).unwrap();
        assert_eq!(keyless.endpoint(), "http://localhost:8899");
    }
}
