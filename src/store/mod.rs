use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::models::{BlacklistKind, Token, Wallet};

pub mod postgres;

pub use postgres::PgStore;

/// Persisted token metadata. The quote is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub date_added: DateTime<Utc>,
}

impl TokenRecord {
    pub fn from_token(token: &Token) -> Self {
        Self {
            mint: token.mint().to_string(),
            name: token.name().to_string(),
            symbol: token.symbol().to_string(),
            decimals: token.decimals(),
            date_added: Utc::now(),
        }
    }

    pub fn into_token(self) -> Token {
        Token::new(self.mint, self.name, self.symbol, self.decimals)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletRecord {
    pub address: String,
    pub name: String,
    pub sol_balance: f64,
    pub date_added: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// Durable storage for tokens, wallets and blacklist entries. Every write is an
/// idempotent upsert.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_tokens(&self) -> Result<Vec<TokenRecord>>;
    async fn load_wallets(&self) -> Result<Vec<WalletRecord>>;
    async fn load_blacklist(&self, kind: BlacklistKind) -> Result<Vec<String>>;
    async fn upsert_token(&self, token: &Token) -> Result<()>;
    /// Inserts the wallet or refreshes its SOL balance and update time.
    async fn upsert_wallet(&self, wallet: &Wallet) -> Result<()>;
    async fn upsert_blacklist_entry(&self, kind: BlacklistKind, mint: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    tokens: HashMap<String, TokenRecord>,
    wallets: HashMap<String, WalletRecord>,
    blacklist: HashMap<BlacklistKind, BTreeSet<String>>,
    token_writes: usize,
    wallet_writes: usize,
    closed: bool,
}

/// Process-local store used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wallets<I>(wallets: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let store = Self::new();
        {
            let mut tables = store.tables.lock();
            let now = Utc::now();
            for (name, address) in wallets {
                tables.wallets.insert(
                    address.clone(),
                    WalletRecord {
                        address,
                        name,
                        sol_balance: 0.0,
                        date_added: now,
                        date_updated: now,
                    },
                );
            }
        }
        store
    }

    pub fn seed_token(&self, record: TokenRecord) {
        self.tables.lock().tokens.insert(record.mint.clone(), record);
    }

    pub fn seed_blacklist(&self, kind: BlacklistKind, mint: &str) {
        self.tables
            .lock()
            .blacklist
            .entry(kind)
            .or_default()
            .insert(mint.to_string());
    }

    pub fn token(&self, mint: &str) -> Option<TokenRecord> {
        self.tables.lock().tokens.get(mint).cloned()
    }

    pub fn wallet(&self, address: &str) -> Option<WalletRecord> {
        self.tables.lock().wallets.get(address).cloned()
    }

    pub fn blacklisted(&self, kind: BlacklistKind, mint: &str) -> bool {
        self.tables
            .lock()
            .blacklist
            .get(&kind)
            .map(|set| set.contains(mint))
            .unwrap_or(false)
    }

    /// Total `upsert_token` calls, including repeats for the same mint.
    pub fn token_writes(&self) -> usize {
        self.tables.lock().token_writes
    }

    pub fn wallet_writes(&self) -> usize {
        self.tables.lock().wallet_writes
    }

    pub fn is_closed(&self) -> bool {
        self.tables.lock().closed
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_tokens(&self) -> Result<Vec<TokenRecord>> {
        Ok(self.tables.lock().tokens.values().cloned().collect())
    }

    async fn load_wallets(&self) -> Result<Vec<WalletRecord>> {
        let mut wallets: Vec<WalletRecord> = self.tables.lock().wallets.values().cloned().collect();
        wallets.sort_by(|a, b| a.date_added.cmp(&b.date_added).then(a.address.cmp(&b.address)));
        Ok(wallets)
    }

    async fn load_blacklist(&self, kind: BlacklistKind) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .blacklist
            .get(&kind)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_token(&self, token: &Token) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.token_writes += 1;
        let record = TokenRecord::from_token(token);
        match tables.tokens.get_mut(token.mint()) {
            Some(existing) => {
                existing.name = record.name;
                existing.symbol = record.symbol;
                existing.decimals = record.decimals;
            }
            None => {
                tables.tokens.insert(record.mint.clone(), record);
            }
        }
        Ok(())
    }

    async fn upsert_wallet(&self, wallet: &Wallet) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.wallet_writes += 1;
        let now = Utc::now();
        tables
            .wallets
            .entry(wallet.address().to_string())
            .and_modify(|record| {
                record.sol_balance = wallet.native_balance();
                record.date_updated = now;
            })
            .or_insert_with(|| WalletRecord {
                address: wallet.address().to_string(),
                name: wallet.name().to_string(),
                sol_balance: wallet.native_balance(),
                date_added: now,
                date_updated: now,
            });
        Ok(())
    }

    async fn upsert_blacklist_entry(&self, kind: BlacklistKind, mint: &str) -> Result<()> {
        self.seed_blacklist(kind, mint);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.tables.lock().closed = true;
        Ok(())
    }
}
