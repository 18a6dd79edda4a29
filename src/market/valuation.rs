use log::debug;
use std::sync::Arc;

use crate::models::Wallet;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValuationSummary {
    pub wallets: usize,
    pub positions: usize,
    /// Positions whose token currently has a quote.
    pub priced: usize,
    pub total_usd: f64,
}

/// Recomputes every position's USD value from the quote its token holds right
/// now. Never waits on the price API.
pub fn revalue_positions(wallets: &[Arc<Wallet>]) -> ValuationSummary {
    let mut summary = ValuationSummary {
        wallets: wallets.len(),
        ..Default::default()
    };

    for wallet in wallets {
        for position in wallet.positions() {
            summary.positions += 1;
            if position.token().usd_price().is_some() {
                summary.priced += 1;
            }
            if let Some(value) = position.revalue() {
                summary.total_usd += value;
            }
        }
    }

    debug!(
        "Revalued {} positions across {} wallets ({} priced)",
        summary.positions, summary.wallets, summary.priced
    );
    summary
}
