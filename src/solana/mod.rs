// Solana chain access over JSON-RPC
use async_trait::async_trait;
use log::{debug, error, warn};
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub lamports: u64,
}

/// One SPL token account owned by a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub address: String,
    pub mint: String,
    pub raw_amount: u64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// `Ok(None)` when the account does not exist.
    async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>>;

    async fn get_token_accounts_by_owner(&self, owner: &str) -> Result<Vec<TokenAccount>>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RawAccountInfo {
    lamports: u64,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: Value,
}

#[derive(Clone)]
pub struct SolanaRpcClient {
    client: Client,
    rpc_url: String,
}

impl std::fmt::Debug for SolanaRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpcClient")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl SolanaRpcClient {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self.client.post(&self.rpc_url).json(&payload).send().await?;
        match response.status() {
            status if status.is_success() => {
                let body: RpcResponse<T> = response.json().await.map_err(|e| {
                    Error::SolanaRpcError(format!("Failed to parse {} response: {}", method, e))
                })?;
                if let Some(err) = body.error {
                    return Err(Error::SolanaRpcError(format!(
                        "{} failed ({}): {}",
                        method, err.code, err.message
                    )));
                }
                Ok(body.result)
            }
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimitExceeded(format!(
                "Solana RPC rate limit exceeded on {}",
                method
            ))),
            status => {
                let error_msg = format!("{} request failed with status: {}", method, status);
                error!("{}", error_msg);
                Err(Error::SolanaRpcError(error_msg))
            }
        }
    }
}

/// Pulls mint and raw amount out of a `jsonParsed` token account.
fn parse_token_account(keyed: KeyedAccount) -> Option<TokenAccount> {
    let info = keyed.account.pointer("/data/parsed/info")?;
    let mint = info.get("mint")?.as_str()?.to_string();
    let raw_amount = info
        .pointer("/tokenAmount/amount")?
        .as_str()?
        .parse::<u64>()
        .ok()?;

    Some(TokenAccount {
        address: keyed.pubkey,
        mint,
        raw_amount,
    })
}

#[async_trait]
impl ChainRpc for SolanaRpcClient {
    async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>> {
        debug!("getAccountInfo {}", address);
        let result: Option<ContextValue<Option<RawAccountInfo>>> = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;

        Ok(result
            .and_then(|r| r.value)
            .map(|raw| AccountInfo { lamports: raw.lamports }))
    }

    async fn get_token_accounts_by_owner(&self, owner: &str) -> Result<Vec<TokenAccount>> {
        debug!("getTokenAccountsByOwner {}", owner);
        let result: Option<ContextValue<Vec<KeyedAccount>>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "programId": TOKEN_PROGRAM_ID },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;

        let keyed = result.map(|r| r.value).unwrap_or_default();
        let mut accounts = Vec::with_capacity(keyed.len());
        for account in keyed {
            let pubkey = account.pubkey.clone();
            match parse_token_account(account) {
                Some(parsed) => accounts.push(parsed),
                None => warn!("Skipping unparseable token account {} for {}", pubkey, owner),
            }
        }
        Ok(accounts)
    }
}
