use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::models::{Token, Wallet};
use crate::utils::TokenCache;

/// One wallet's share of an overlapping token.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub wallet_name: String,
    pub wallet_address: String,
    pub balance: f64,
    pub usd_value: f64,
}

/// A mint held by more than one tracked wallet.
#[derive(Debug, Clone)]
pub struct OverlappingToken {
    pub token: Arc<Token>,
    pub holders: Vec<Holding>,
    pub total_usd: f64,
}

impl OverlappingToken {
    pub fn mint(&self) -> &str {
        self.token.mint()
    }
}

/// Distinct tokens behind the positions `wallets` hold right now, as the
/// instances `cache` stores, ordered by mint. A mint with no cached instance
/// (a rate-limited lookup still pending) is left out.
pub fn held_tokens(wallets: &[Arc<Wallet>], cache: &TokenCache) -> Vec<Arc<Token>> {
    let mut by_mint: BTreeMap<String, Arc<Token>> = BTreeMap::new();
    for wallet in wallets {
        for position in wallet.positions() {
            let mint = position.token().mint();
            if by_mint.contains_key(mint) {
                continue;
            }
            if let Some(token) = cache.get(mint) {
                by_mint.insert(mint.to_string(), token);
            }
        }
    }
    by_mint.into_values().collect()
}

/// Groups every position by mint and keeps the mints that at least two
/// wallets hold with a combined value of `min_total_usd` or more. Largest
/// total first.
pub fn overlapping_tokens(wallets: &[Arc<Wallet>], min_total_usd: f64) -> Vec<OverlappingToken> {
    let mut by_mint: BTreeMap<String, (Arc<Token>, Vec<Holding>)> = BTreeMap::new();

    for wallet in wallets {
        for position in wallet.positions() {
            let token = position.token();
            let entry = by_mint
                .entry(token.mint().to_string())
                .or_insert_with(|| (Arc::clone(token), Vec::new()));
            entry.1.push(Holding {
                wallet_name: wallet.name().to_string(),
                wallet_address: wallet.address().to_string(),
                balance: position.balance(),
                usd_value: position.usd_balance().unwrap_or(0.0),
            });
        }
    }

    let mut overlaps: Vec<OverlappingToken> = by_mint
        .into_values()
        .filter_map(|(token, mut holders)| {
            let distinct: HashSet<&str> = holders.iter().map(|h| h.wallet_address.as_str()).collect();
            if distinct.len() < 2 {
                return None;
            }
            let total_usd: f64 = holders.iter().map(|h| h.usd_value).sum();
            if total_usd < min_total_usd {
                return None;
            }
            holders.sort_by(|a, b| b.usd_value.partial_cmp(&a.usd_value).unwrap_or(Ordering::Equal));
            Some(OverlappingToken {
                token,
                holders,
                total_usd,
            })
        })
        .collect();

    overlaps.sort_by(|a, b| b.total_usd.partial_cmp(&a.total_usd).unwrap_or(Ordering::Equal));
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketQuote, Position};

    fn wallet_holding(address: &str, holdings: &[(&Arc<Token>, u64)]) -> Arc<Wallet> {
        let wallet = Arc::new(Wallet::new(address, format!("{}-name", address), 0));
        for (i, (token, raw)) in holdings.iter().enumerate() {
            let position = Position::new(address, format!("{}-{}", address, i), Arc::clone(token), *raw);
            position.revalue();
            wallet.insert_position(Arc::new(position));
        }
        wallet
    }

    fn priced_token(mint: &str, price: f64) -> Arc<Token> {
        let token = Arc::new(Token::new(mint, mint, mint, 0));
        token.set_quote(MarketQuote::new(mint, price));
        token
    }

    #[test]
    fn test_overlap_requires_two_wallets_and_threshold() {
        let big = priced_token("BIG", 10.0);
        let small = priced_token("SMALL", 1.0);
        let solo = priced_token("SOLO", 100.0);

        let a = wallet_holding("a", &[(&big, 800), (&small, 10), (&solo, 1_000)]);
        let b = wallet_holding("b", &[(&big, 400), (&small, 10)]);

        let overlaps = overlapping_tokens(&[a, b], 10_000.0);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].mint(), "BIG");
        assert_eq!(overlaps[0].total_usd, 12_000.0);
        assert_eq!(overlaps[0].holders[0].wallet_address, "a");
        assert_eq!(overlaps[0].holders[1].usd_value, 4_000.0);
    }

    #[test]
    fn test_held_tokens_use_cached_instances_only() {
        let cache = TokenCache::new();
        let usdc = cache.insert(Arc::new(Token::new("USDC", "USD Coin", "USDC", 6)));
        cache.insert(Arc::new(Token::new("IDLE", "Idle", "IDLE", 9)));
        let placeholder = Arc::new(Token::unknown("USDC"));
        let pending = Arc::new(Token::unknown("PENDING"));

        let a = wallet_holding("a", &[(&placeholder, 5), (&pending, 1)]);
        let b = wallet_holding("b", &[(&usdc, 2_000_000)]);

        let held = held_tokens(&[a, b], &cache);
        assert_eq!(held.len(), 1);
        assert!(Arc::ptr_eq(&held[0], &usdc));
    }

    #[test]
    fn test_held_tokens_follow_current_positions() {
        let cache = TokenCache::new();
        let one = cache.insert(Arc::new(Token::new("ONE", "One", "ONE", 0)));
        let two = cache.insert(Arc::new(Token::new("TWO", "Two", "TWO", 0)));
        let wallet = wallet_holding("a", &[(&one, 10), (&two, 10)]);
        assert_eq!(held_tokens(&[Arc::clone(&wallet)], &cache).len(), 2);

        wallet.retain_positions(&HashSet::from(["a-1".to_string()]));
        let held = held_tokens(&[wallet], &cache);
        let mints: Vec<&str> = held.iter().map(|t| t.mint()).collect();
        assert_eq!(mints, vec!["TWO"]);
    }

    #[test]
    fn test_overlaps_sorted_by_total() {
        let one = priced_token("ONE", 1.0);
        let two = priced_token("TWO", 2.0);
        let a = wallet_holding("a", &[(&one, 10), (&two, 10)]);
        let b = wallet_holding("b", &[(&one, 10), (&two, 10)]);

        let overlaps = overlapping_tokens(&[a, b], 0.0);
        let mints: Vec<&str> = overlaps.iter().map(|o| o.mint()).collect();
        assert_eq!(mints, vec!["TWO", "ONE"]);
    }
}
