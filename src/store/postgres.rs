use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use super::{Store, TokenRecord, WalletRecord};
use crate::error::{Error, Result};
use crate::models::{BlacklistKind, Token, Wallet};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS token (
        mint_address TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        ticker TEXT NOT NULL,
        decimals SMALLINT NOT NULL,
        date_added TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS wallet (
        wallet_address TEXT PRIMARY KEY,
        wallet_name TEXT NOT NULL,
        sol_balance DOUBLE PRECISION NOT NULL DEFAULT 0,
        date_added TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        date_updated TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS blacklisted_token (
        mint_address TEXT NOT NULL,
        kind TEXT NOT NULL,
        date_added TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (mint_address, kind)
    )",
];

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to database with {} max connections", max_connections);
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn token_from_row(row: &PgRow) -> Result<TokenRecord> {
        let decimals: i16 = row.try_get("decimals")?;
        Ok(TokenRecord {
            mint: row.try_get("mint_address")?,
            name: row.try_get("name")?,
            symbol: row.try_get("ticker")?,
            decimals: u8::try_from(decimals)
                .map_err(|_| Error::DatabaseError(format!("Invalid decimals: {}", decimals)))?,
            date_added: row.try_get::<DateTime<Utc>, _>("date_added")?,
        })
    }

    fn wallet_from_row(row: &PgRow) -> Result<WalletRecord> {
        Ok(WalletRecord {
            address: row.try_get("wallet_address")?,
            name: row.try_get("wallet_name")?,
            sol_balance: row.try_get("sol_balance")?,
            date_added: row.try_get("date_added")?,
            date_updated: row.try_get("date_updated")?,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn load_tokens(&self) -> Result<Vec<TokenRecord>> {
        let rows = sqlx::query("SELECT mint_address, name, ticker, decimals, date_added FROM token")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::token_from_row).collect()
    }

    async fn load_wallets(&self) -> Result<Vec<WalletRecord>> {
        let rows = sqlx::query(
            "SELECT wallet_address, wallet_name, sol_balance, date_added, date_updated
             FROM wallet ORDER BY date_added, wallet_address",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::wallet_from_row).collect()
    }

    async fn load_blacklist(&self, kind: BlacklistKind) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT mint_address FROM blacklisted_token WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("mint_address").map_err(Error::from))
            .collect()
    }

    async fn upsert_token(&self, token: &Token) -> Result<()> {
        debug!("Persisting token {}", token.mint());
        sqlx::query(
            "INSERT INTO token (mint_address, name, ticker, decimals, date_added)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (mint_address) DO UPDATE
             SET name = EXCLUDED.name, ticker = EXCLUDED.ticker, decimals = EXCLUDED.decimals",
        )
        .bind(token.mint())
        .bind(token.name())
        .bind(token.symbol())
        .bind(token.decimals() as i16)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_wallet(&self, wallet: &Wallet) -> Result<()> {
        debug!("Persisting wallet {}", wallet.address());
        sqlx::query(
            "INSERT INTO wallet (wallet_address, wallet_name, sol_balance, date_added, date_updated)
             VALUES ($1, $2, $3, NOW(), NOW())
             ON CONFLICT (wallet_address) DO UPDATE
             SET sol_balance = EXCLUDED.sol_balance, date_updated = NOW()",
        )
        .bind(wallet.address())
        .bind(wallet.name())
        .bind(wallet.native_balance())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_blacklist_entry(&self, kind: BlacklistKind, mint: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO blacklisted_token (mint_address, kind, date_added)
             VALUES ($1, $2, NOW())
             ON CONFLICT (mint_address, kind) DO NOTHING",
        )
        .bind(mint)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Database pool closed");
        Ok(())
    }
}
