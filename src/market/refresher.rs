use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::{PriceApi, PriceBatch};
use crate::models::{BlacklistKind, MarketQuote, Token};
use crate::store::Store;
use crate::utils::{Blacklist, RateLimiter};

/// Why a refresh cycle stopped before its last batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    RateLimited,
    EmptyResponse,
    RequestFailed(String),
    ShuttingDown,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::RateLimited => write!(f, "rate limited"),
            AbortReason::EmptyResponse => write!(f, "empty response"),
            AbortReason::RequestFailed(msg) => write!(f, "request failed: {}", msg),
            AbortReason::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Mints in the working set after removing price-blacklisted ones.
    pub requested: usize,
    pub batches_sent: usize,
    pub quotes_updated: usize,
    pub newly_blacklisted: usize,
    pub aborted: Option<AbortReason>,
}

impl RefreshSummary {
    pub fn completed(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Re-prices tokens through batched price API calls.
///
/// Batches go out one at a time, each behind the inter-batch limiter. A price
/// that never arrives leaves the previous quote in place.
pub struct MarketDataRefresher {
    api: Arc<dyn PriceApi>,
    store: Arc<dyn Store>,
    blacklist: Arc<Blacklist>,
    batch_size: usize,
    limiter: RateLimiter,
    shutdown: Option<watch::Receiver<bool>>,
}

impl MarketDataRefresher {
    pub fn new(
        api: Arc<dyn PriceApi>,
        store: Arc<dyn Store>,
        blacklist: Arc<Blacklist>,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            api,
            store,
            blacklist,
            batch_size: batch_size.max(1),
            limiter: RateLimiter::spaced("price", batch_delay),
            shutdown: None,
        }
    }

    /// Stops the cycle between batches once the flag flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    pub async fn refresh_all(&self, tokens: &[Arc<Token>]) -> RefreshSummary {
        let working: BTreeMap<&str, &Arc<Token>> = tokens
            .iter()
            .filter(|t| !self.blacklist.contains(t.mint()))
            .map(|t| (t.mint(), t))
            .collect();

        let mut summary = RefreshSummary {
            requested: working.len(),
            ..Default::default()
        };
        if working.is_empty() {
            debug!("No tokens to price");
            return summary;
        }

        let mints: Vec<String> = working.keys().map(|m| m.to_string()).collect();
        for batch in mints.chunks(self.batch_size) {
            if self.is_shutting_down() {
                summary.aborted = Some(AbortReason::ShuttingDown);
                break;
            }

            self.limiter.acquire().await;
            summary.batches_sent += 1;
            debug!("Requesting prices for {} mints", batch.len());

            let prices = match self.api.get_prices(batch).await {
                Ok(PriceBatch::Prices(prices)) => prices,
                Ok(PriceBatch::RateLimited) => {
                    warn!("Price API rate limited, ending refresh cycle early");
                    summary.aborted = Some(AbortReason::RateLimited);
                    break;
                }
                Ok(PriceBatch::Empty) => {
                    warn!("Price API returned no data, ending refresh cycle early");
                    summary.aborted = Some(AbortReason::EmptyResponse);
                    break;
                }
                Err(e) => {
                    error!("Price request failed: {}", e);
                    summary.aborted = Some(AbortReason::RequestFailed(e.to_string()));
                    break;
                }
            };

            for mint in batch {
                let token = match working.get(mint.as_str()) {
                    Some(token) => token,
                    None => continue,
                };
                match prices.get(mint) {
                    Some(Some(price)) => {
                        token.set_quote(MarketQuote::new(mint.clone(), *price));
                        summary.quotes_updated += 1;
                    }
                    Some(None) => {
                        if self.blacklist.insert(mint) {
                            summary.newly_blacklisted += 1;
                            info!("No price available for {} ({}), blacklisting", token.symbol(), mint);
                            if let Err(e) = self
                                .store
                                .upsert_blacklist_entry(BlacklistKind::Price, mint)
                                .await
                            {
                                error!("Failed to persist price blacklist entry {}: {}", mint, e);
                            }
                        }
                    }
                    None => {}
                }
            }
        }

        summary
    }
}
