use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::helius::DEFAULT_HELIUS_URL;
use crate::api::jupiter::DEFAULT_JUPITER_PRICE_URL;
use crate::solana::DEFAULT_RPC_URL;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_helius_url")]
    pub helius_url: String,
    #[serde(default)]
    pub helius_api_key: String,
    #[serde(default = "default_jupiter_price_url")]
    pub jupiter_price_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            helius_url: default_helius_url(),
            helius_api_key: String::new(),
            jupiter_price_url: default_jupiter_price_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SolanaConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Timing and sizing knobs for the tracker.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub refresh_interval_secs: u64,
    pub valuation_interval_secs: u64,
    /// Mint ids per price request.
    pub price_batch_size: usize,
    pub price_batch_delay_ms: u64,
    /// Concurrent metadata requests.
    pub metadata_permits: usize,
    pub metadata_requests_per_second: u32,
    pub bootstrap_wallet_delay_ms: u64,
    pub shutdown_grace_secs: u64,
    pub overlap_min_usd: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15,
            valuation_interval_secs: 15,
            price_batch_size: 50,
            price_batch_delay_ms: 4000,
            metadata_permits: 5,
            metadata_requests_per_second: 10,
            bootstrap_wallet_delay_ms: 2000,
            shutdown_grace_secs: 5,
            overlap_min_usd: 10_000.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 || self.valuation_interval_secs == 0 {
            bail!("Refresh and valuation intervals must be at least one second");
        }
        if self.price_batch_size == 0 {
            bail!("price_batch_size must be positive");
        }
        if self.metadata_permits == 0 || self.metadata_requests_per_second == 0 {
            bail!("Metadata permits and request rate must be positive");
        }
        if !self.overlap_min_usd.is_finite() || self.overlap_min_usd < 0.0 {
            bail!("overlap_min_usd must be a non-negative number");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn valuation_interval(&self) -> Duration {
        Duration::from_secs(self.valuation_interval_secs)
    }

    pub fn price_batch_delay(&self) -> Duration {
        Duration::from_millis(self.price_batch_delay_ms)
    }

    pub fn bootstrap_wallet_delay(&self) -> Duration {
        Duration::from_millis(self.bootstrap_wallet_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write log lines to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_helius_url() -> String {
    DEFAULT_HELIUS_URL.to_string()
}

fn default_jupiter_price_url() -> String {
    DEFAULT_JUPITER_PRICE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&config_str)?;
        config.apply_env();
        config.tracker.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise starts from defaults. Environment
    /// overrides apply either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env();
        config.tracker.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var("HELIUS_API_KEY") {
            if !key.is_empty() {
                self.api.helius_api_key = key;
            }
        }
        if let Ok(url) = env::var("SOLANA_RPC_URL") {
            if !url.is_empty() {
                self.solana.rpc_url = url;
            }
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.is_empty() {
                match self.database.as_mut() {
                    Some(db) => db.url = url,
                    None => {
                        self.database = Some(DatabaseConfig {
                            url,
                            max_connections: default_max_connections(),
                        })
                    }
                }
            }
        }
    }
}
