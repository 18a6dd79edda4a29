use std::sync::Arc;

use crate::market::{RefreshSummary, ValuationSummary};
use crate::models::Wallet;

/// Notifications for a presentation layer. Delivered over a broadcast channel;
/// slow subscribers may miss events.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A wallet finished ingestion, either during bootstrap or via `add_wallet`.
    WalletLoaded(Arc<Wallet>),
    /// The bootstrap lane is done.
    WalletsLoaded { count: usize },
    MarketDataUpdated(RefreshSummary),
    PositionsRevalued(ValuationSummary),
}
