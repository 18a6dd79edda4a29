use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use super::Token;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Ingestion progress of a wallet. Wallets are never removed, so there is no
/// terminal "removed" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletState {
    Unknown,
    AccountResolved,
    PositionsResolving,
    PositionsResolved,
}

/// A wallet's holding of one token account.
#[derive(Debug)]
pub struct Position {
    wallet_address: String,
    account_address: String,
    token: Arc<Token>,
    balance: f64,
    usd_balance: RwLock<Option<f64>>,
}

impl Position {
    pub fn new(
        wallet_address: impl Into<String>,
        account_address: impl Into<String>,
        token: Arc<Token>,
        raw_amount: u64,
    ) -> Self {
        let balance = token.to_native(raw_amount);
        Self {
            wallet_address: wallet_address.into(),
            account_address: account_address.into(),
            token,
            balance,
            usd_balance: RwLock::new(None),
        }
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub fn account_address(&self) -> &str {
        &self.account_address
    }

    pub fn token(&self) -> &Arc<Token> {
        &self.token
    }

    /// Balance in native token units.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// USD value as of the last valuation cycle, `None` until the token is priced.
    pub fn usd_balance(&self) -> Option<f64> {
        *self.usd_balance.read()
    }

    /// Recomputes the USD value from the token's current quote. A token without
    /// a quote leaves the previous value in place.
    pub fn revalue(&self) -> Option<f64> {
        match self.token.usd_price() {
            Some(price) => {
                let value = self.balance * price;
                *self.usd_balance.write() = Some(value);
                Some(value)
            }
            None => self.usd_balance(),
        }
    }
}

#[derive(Debug)]
pub struct Wallet {
    address: String,
    name: String,
    native_balance: RwLock<f64>,
    positions: DashMap<String, Arc<Position>>,
    state: RwLock<WalletState>,
    updated_at: RwLock<DateTime<Utc>>,
}

impl Wallet {
    pub fn new(address: impl Into<String>, name: impl Into<String>, lamports: u64) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            native_balance: RwLock::new(lamports as f64 / LAMPORTS_PER_SOL),
            positions: DashMap::new(),
            state: RwLock::new(WalletState::AccountResolved),
            updated_at: RwLock::new(Utc::now()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native currency (SOL) balance captured at the last ingestion.
    pub fn native_balance(&self) -> f64 {
        *self.native_balance.read()
    }

    pub fn set_native_balance(&self, lamports: u64) {
        *self.native_balance.write() = lamports as f64 / LAMPORTS_PER_SOL;
        *self.updated_at.write() = Utc::now();
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        *self.updated_at.read()
    }

    pub fn state(&self) -> WalletState {
        *self.state.read()
    }

    pub fn set_state(&self, state: WalletState) {
        *self.state.write() = state;
    }

    pub fn insert_position(&self, position: Arc<Position>) -> Option<Arc<Position>> {
        self.positions
            .insert(position.account_address().to_string(), position)
    }

    /// Drops every position whose token account is not in `accounts`.
    /// Returns how many were removed.
    pub fn retain_positions(&self, accounts: &HashSet<String>) -> usize {
        let before = self.positions.len();
        self.positions.retain(|account, _| accounts.contains(account));
        before - self.positions.len()
    }

    pub fn position(&self, account_address: &str) -> Option<Arc<Position>> {
        self.positions.get(account_address).map(|p| Arc::clone(p.value()))
    }

    pub fn positions(&self) -> Vec<Arc<Position>> {
        self.positions.iter().map(|p| Arc::clone(p.value())).collect()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Sum of all priced positions.
    pub fn total_usd(&self) -> f64 {
        self.positions
            .iter()
            .filter_map(|p| p.value().usd_balance())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketQuote;

    #[test]
    fn test_position_revalue_uses_current_quote() {
        let token = Arc::new(Token::new("mint", "Test", "TST", 6));
        let position = Position::new("wallet", "account", Arc::clone(&token), 2_000_000);
        assert_eq!(position.balance(), 2.0);
        assert_eq!(position.revalue(), None);

        token.set_quote(MarketQuote::new("mint", 3.5));
        assert_eq!(position.usd_balance(), None);
        assert_eq!(position.revalue(), Some(7.0));
        assert_eq!(position.usd_balance(), Some(7.0));
    }

    #[test]
    fn test_wallet_native_balance_in_sol() {
        let wallet = Wallet::new("addr", "main", 1_500_000_000);
        assert_eq!(wallet.native_balance(), 1.5);
        assert_eq!(wallet.state(), WalletState::AccountResolved);

        wallet.set_native_balance(250_000_000);
        assert_eq!(wallet.native_balance(), 0.25);
    }

    #[test]
    fn test_retain_positions_drops_missing_accounts() {
        let wallet = Wallet::new("addr", "main", 0);
        let token = Arc::new(Token::new("mint", "Test", "TST", 0));
        for account in ["a", "b", "c"] {
            wallet.insert_position(Arc::new(Position::new("addr", account, Arc::clone(&token), 1)));
        }

        let keep: HashSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(wallet.retain_positions(&keep), 1);
        assert!(wallet.position("b").is_none());
        assert_eq!(wallet.position_count(), 2);
    }

    #[test]
    fn test_total_usd_skips_unpriced_positions() {
        let wallet = Wallet::new("addr", "main", 0);
        let priced = Arc::new(Token::new("m1", "One", "ONE", 0));
        let unpriced = Arc::new(Token::new("m2", "Two", "TWO", 0));
        priced.set_quote(MarketQuote::new("m1", 2.0));

        let p1 = Arc::new(Position::new("addr", "a1", priced, 10));
        let p2 = Arc::new(Position::new("addr", "a2", unpriced, 10));
        p1.revalue();
        p2.revalue();
        wallet.insert_position(p1);
        wallet.insert_position(p2);

        assert_eq!(wallet.total_usd(), 20.0);
    }
}
