#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wallet_tracker::api::{AssetMetadata, MetadataApi, PriceApi, PriceBatch};
use wallet_tracker::config::TrackerConfig;
use wallet_tracker::error::{Error, Result};
use wallet_tracker::solana::{AccountInfo, ChainRpc, TokenAccount};
use wallet_tracker::store::MemoryStore;
use wallet_tracker::tracker::Tracker;

pub const WALLET_A: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const WALLET_B: &str = "Vote111111111111111111111111111111111111111";
pub const WALLET_C: &str = "Stake11111111111111111111111111111111111111";

pub const MINT_USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const MINT_BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

/// In-memory chain with per-owner lamports and token accounts.
#[derive(Default)]
pub struct FakeChain {
    accounts: Mutex<HashMap<String, (u64, Vec<TokenAccount>)>>,
    account_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_wallet(&self, owner: &str, lamports: u64, holdings: &[(&str, &str, u64)]) {
        let accounts = holdings
            .iter()
            .map(|(address, mint, raw_amount)| TokenAccount {
                address: address.to_string(),
                mint: mint.to_string(),
                raw_amount: *raw_amount,
            })
            .collect();
        self.accounts
            .lock()
            .insert(owner.to_string(), (lamports, accounts));
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .accounts
            .lock()
            .get(address)
            .map(|(lamports, _)| AccountInfo { lamports: *lamports }))
    }

    async fn get_token_accounts_by_owner(&self, owner: &str) -> Result<Vec<TokenAccount>> {
        self.accounts
            .lock()
            .get(owner)
            .map(|(_, accounts)| accounts.clone())
            .ok_or_else(|| Error::SolanaRpcError(format!("unknown owner {}", owner)))
    }
}

/// Metadata API answering from a fixed table; unknown mints fail.
#[derive(Default)]
pub struct FakeMetadata {
    assets: Mutex<HashMap<String, AssetMetadata>>,
    throttled: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, mint: &str, name: &str, symbol: &str, decimals: u8) -> Self {
        self.assets.lock().insert(
            mint.to_string(),
            AssetMetadata {
                name: Some(name.to_string()),
                symbol: Some(symbol.to_string()),
                decimals: Some(decimals),
            },
        );
        self
    }

    /// The next lookup of `mint` answers with a 429.
    pub fn throttle_once(&self, mint: &str) {
        self.throttled.lock().insert(mint.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataApi for FakeMetadata {
    async fn get_asset_metadata(&self, mint: &str) -> Result<AssetMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.throttled.lock().remove(mint) {
            return Err(Error::RateLimitExceeded(format!("asset {}", mint)));
        }
        self.assets
            .lock()
            .get(mint)
            .cloned()
            .ok_or_else(|| Error::ApiError(format!("asset {} not found", mint)))
    }
}

/// Price API returning whatever has been set; unset mints are omitted.
#[derive(Default)]
pub struct FakePrices {
    prices: Mutex<HashMap<String, Option<f64>>>,
    requests: Mutex<Vec<Vec<String>>>,
}

impl FakePrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, mint: &str, price: Option<f64>) {
        self.prices.lock().insert(mint.to_string(), price);
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PriceApi for FakePrices {
    async fn get_prices(&self, mints: &[String]) -> Result<PriceBatch> {
        self.requests.lock().push(mints.to_vec());
        let prices = self.prices.lock();
        Ok(PriceBatch::Prices(
            mints
                .iter()
                .filter_map(|m| prices.get(m).map(|p| (m.clone(), *p)))
                .collect(),
        ))
    }
}

pub fn test_tracker_config() -> TrackerConfig {
    TrackerConfig {
        refresh_interval_secs: 1,
        valuation_interval_secs: 1,
        price_batch_size: 50,
        price_batch_delay_ms: 0,
        metadata_permits: 5,
        metadata_requests_per_second: 1000,
        bootstrap_wallet_delay_ms: 0,
        shutdown_grace_secs: 1,
        overlap_min_usd: 10_000.0,
    }
}

pub struct TestHarness {
    pub tracker: Arc<Tracker>,
    pub chain: Arc<FakeChain>,
    pub metadata: Arc<FakeMetadata>,
    pub prices: Arc<FakePrices>,
    pub store: Arc<MemoryStore>,
}

pub fn create_test_harness(store: MemoryStore) -> TestHarness {
    create_test_harness_with(store, test_tracker_config())
}

pub fn create_test_harness_with(store: MemoryStore, config: TrackerConfig) -> TestHarness {
    let chain = Arc::new(FakeChain::new());
    let metadata = Arc::new(
        FakeMetadata::new()
            .with_token(MINT_USDC, "USD Coin", "USDC", 6)
            .with_token(MINT_BONK, "Bonk", "Bonk", 5),
    );
    let prices = Arc::new(FakePrices::new());
    let store = Arc::new(store);

    let tracker = Arc::new(Tracker::new(
        config,
        chain.clone(),
        metadata.clone(),
        prices.clone(),
        store.clone(),
    ));

    TestHarness {
        tracker,
        chain,
        metadata,
        prices,
        store,
    }
}
