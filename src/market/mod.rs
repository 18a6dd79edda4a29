pub mod refresher;
pub mod valuation;

pub use refresher::{AbortReason, MarketDataRefresher, RefreshSummary};
pub use valuation::{revalue_positions, ValuationSummary};
