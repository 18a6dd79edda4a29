use serde::{Deserialize, Serialize};
use std::fmt;

pub mod market;
pub mod token;
pub mod wallet;

pub use market::MarketQuote;
pub use token::{Token, UNKNOWN_TOKEN_NAME, UNKNOWN_TOKEN_SYMBOL};
pub use wallet::{Position, Wallet, WalletState, LAMPORTS_PER_SOL};

/// Which remote call failed to produce usable data for a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlacklistKind {
    /// The metadata API could not describe the mint.
    Metadata,
    /// The price API has no tradable price for the mint.
    Price,
}

impl BlacklistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlacklistKind::Metadata => "metadata",
            BlacklistKind::Price => "price",
        }
    }
}

impl fmt::Display for BlacklistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
