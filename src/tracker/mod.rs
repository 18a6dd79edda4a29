use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::api::{MetadataApi, PriceApi};
use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::market::{revalue_positions, MarketDataRefresher, RefreshSummary, ValuationSummary};
use crate::models::{BlacklistKind, Token, Wallet};
use crate::solana::ChainRpc;
use crate::store::{Store, WalletRecord};
use crate::tokens::TokenResolver;
use crate::utils::{Blacklist, RateLimiter, TokenCache};
use crate::validation::{validate_address, validate_wallet_name};
use crate::wallet::{WalletIngestionPipeline, WalletMap};

pub mod analysis;
pub mod events;

pub use analysis::{held_tokens, overlapping_tokens, Holding, OverlappingToken};
pub use events::TrackerEvent;

const EVENT_CAPACITY: usize = 256;

/// What `load_state` pulled out of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadedState {
    pub tokens: usize,
    pub wallets: usize,
    pub metadata_blacklist: usize,
    pub price_blacklist: usize,
}

/// Owns the shared caches and drives bootstrap plus the two periodic cycles.
///
/// Build one per process and share it as `Arc<Tracker>`.
pub struct Tracker {
    config: TrackerConfig,
    store: Arc<dyn Store>,
    token_cache: Arc<TokenCache>,
    metadata_blacklist: Arc<Blacklist>,
    price_blacklist: Arc<Blacklist>,
    wallets: Arc<WalletMap>,
    pipeline: WalletIngestionPipeline,
    refresher: MarketDataRefresher,
    events: broadcast::Sender<TrackerEvent>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    pending_wallets: Mutex<Vec<WalletRecord>>,
    bootstrapping: AtomicBool,
    bootstrap_limiter: RateLimiter,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        chain: Arc<dyn ChainRpc>,
        metadata: Arc<dyn MetadataApi>,
        prices: Arc<dyn PriceApi>,
        store: Arc<dyn Store>,
    ) -> Self {
        let token_cache = Arc::new(TokenCache::new());
        let metadata_blacklist = Arc::new(Blacklist::new(BlacklistKind::Metadata));
        let price_blacklist = Arc::new(Blacklist::new(BlacklistKind::Price));
        let wallets = Arc::new(WalletMap::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let resolver = Arc::new(TokenResolver::new(
            metadata,
            Arc::clone(&store),
            Arc::clone(&token_cache),
            Arc::clone(&metadata_blacklist),
            config.metadata_permits,
            config.metadata_requests_per_second,
        ));
        let pipeline = WalletIngestionPipeline::new(
            chain,
            resolver,
            Arc::clone(&store),
            Arc::clone(&wallets),
            shutdown_rx.clone(),
        );
        let refresher = MarketDataRefresher::new(
            prices,
            Arc::clone(&store),
            Arc::clone(&price_blacklist),
            config.price_batch_size,
            config.price_batch_delay(),
        )
        .with_shutdown(shutdown_rx);
        let bootstrap_limiter = RateLimiter::spaced("bootstrap", config.bootstrap_wallet_delay());

        Self {
            config,
            store,
            token_cache,
            metadata_blacklist,
            price_blacklist,
            wallets,
            pipeline,
            refresher,
            events,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            pending_wallets: Mutex::new(Vec::new()),
            bootstrapping: AtomicBool::new(false),
            bootstrap_limiter,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Fills the caches and blacklists from the store and queues known wallets
    /// for bootstrap.
    pub async fn load_state(&self) -> Result<LoadedState> {
        let tokens = self.store.load_tokens().await?;
        let token_count = tokens.len();
        for record in tokens {
            self.token_cache.insert(Arc::new(record.into_token()));
        }

        self.metadata_blacklist
            .extend(self.store.load_blacklist(BlacklistKind::Metadata).await?);
        self.price_blacklist
            .extend(self.store.load_blacklist(BlacklistKind::Price).await?);

        let wallets = self.store.load_wallets().await?;
        let loaded = LoadedState {
            tokens: token_count,
            wallets: wallets.len(),
            metadata_blacklist: self.metadata_blacklist.len(),
            price_blacklist: self.price_blacklist.len(),
        };
        *self.pending_wallets.lock() = wallets;

        info!(
            "Loaded {} tokens, {} wallets, {} metadata and {} price blacklist entries",
            loaded.tokens, loaded.wallets, loaded.metadata_blacklist, loaded.price_blacklist
        );
        Ok(loaded)
    }

    /// Starts both periodic cycles and the bootstrap lane.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();

        let tracker = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = tracker.config.refresh_interval();
            tracker
                .run_periodic("market data refresh", period, |t| async move {
                    t.refresh_market_data().await;
                })
                .await;
        }));

        let tracker = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = tracker.config.valuation_interval();
            tracker
                .run_periodic("position valuation", period, |t| async move {
                    t.revalue_positions();
                })
                .await;
        }));

        let tracker = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            tracker.bootstrap().await;
        }));

        info!("Tracker started");
    }

    async fn run_periodic<F, Fut>(self: &Arc<Self>, name: &str, period: Duration, cycle: F)
    where
        F: Fn(Arc<Self>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    debug!("Running {} cycle", name);
                    cycle(Arc::clone(self)).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("{} timer stopped", name);
    }

    /// Ingests every wallet queued by `load_state`, one at a time. Returns how
    /// many were loaded; a second concurrent call returns 0 immediately.
    pub async fn bootstrap(&self) -> usize {
        if self.bootstrapping.swap(true, Ordering::SeqCst) {
            warn!("Bootstrap already running");
            return 0;
        }

        let pending = std::mem::take(&mut *self.pending_wallets.lock());
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut loaded = 0;

        for record in pending {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping bootstrap");
                break;
            }
            tokio::select! {
                _ = self.bootstrap_limiter.acquire() => {}
                _ = shutdown.changed() => {
                    info!("Shutdown requested, stopping bootstrap");
                    break;
                }
            }

            match self.pipeline.ingest(&record.address, &record.name).await {
                Some(wallet) => {
                    loaded += 1;
                    self.emit(TrackerEvent::WalletLoaded(wallet));
                }
                None => warn!("Could not load stored wallet {} ({})", record.name, record.address),
            }
        }

        info!("Bootstrap finished, {} wallets loaded", loaded);
        self.emit(TrackerEvent::WalletsLoaded { count: loaded });
        self.bootstrapping.store(false, Ordering::SeqCst);
        loaded
    }

    /// Validates and ingests a wallet. Bad input is rejected before any
    /// remote call.
    pub async fn add_wallet(&self, name: &str, address: &str) -> Result<Arc<Wallet>> {
        let name = name.trim();
        let address = address.trim();
        validate_wallet_name(name)?;
        validate_address(address)?;
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let wallet = self
            .pipeline
            .ingest(address, name)
            .await
            .ok_or_else(|| Error::WalletNotFound(address.to_string()))?;
        self.emit(TrackerEvent::WalletLoaded(Arc::clone(&wallet)));
        Ok(wallet)
    }

    /// Wallets sorted by name.
    pub fn list_wallets(&self) -> Vec<Arc<Wallet>> {
        let mut wallets: Vec<Arc<Wallet>> = self.wallets.iter().map(|w| Arc::clone(w.value())).collect();
        wallets.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.address().cmp(b.address())));
        wallets
    }

    pub fn wallet(&self, address: &str) -> Option<Arc<Wallet>> {
        self.wallets.get(address).map(|w| Arc::clone(w.value()))
    }

    /// Every known token, whether loaded from the store or resolved.
    pub fn list_tokens(&self) -> Vec<Arc<Token>> {
        let mut tokens = self.token_cache.values();
        tokens.sort_by(|a, b| a.mint().cmp(b.mint()));
        tokens
    }

    /// Tokens currently held by a wallet ingested in this process; the
    /// refresher prices these. Rebuilt from positions on every call, so a
    /// divested mint drops out as soon as its last position does.
    pub fn session_tokens(&self) -> Vec<Arc<Token>> {
        held_tokens(&self.list_wallets(), &self.token_cache)
    }

    pub fn is_blacklisted(&self, kind: BlacklistKind, mint: &str) -> bool {
        match kind {
            BlacklistKind::Metadata => self.metadata_blacklist.contains(mint),
            BlacklistKind::Price => self.price_blacklist.contains(mint),
        }
    }

    pub async fn refresh_market_data(&self) -> RefreshSummary {
        let tokens = self.session_tokens();
        let summary = self.refresher.refresh_all(&tokens).await;
        match &summary.aborted {
            Some(reason) => warn!(
                "Market data refresh ended early ({}): {} quotes updated in {} batches",
                reason, summary.quotes_updated, summary.batches_sent
            ),
            None => info!(
                "Market data refreshed: {} of {} tokens priced in {} batches",
                summary.quotes_updated, summary.requested, summary.batches_sent
            ),
        }
        self.emit(TrackerEvent::MarketDataUpdated(summary.clone()));
        summary
    }

    pub fn revalue_positions(&self) -> ValuationSummary {
        let summary = revalue_positions(&self.list_wallets());
        self.emit(TrackerEvent::PositionsRevalued(summary));
        summary
    }

    pub fn overlapping_tokens(&self, min_total_usd: f64) -> Vec<OverlappingToken> {
        overlapping_tokens(&self.list_wallets(), min_total_usd)
    }

    /// Stops the timers and the bootstrap lane, waiting up to the configured
    /// grace period for each, then closes the store.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            debug!("Shutdown already requested");
        }
        info!("Shutting down tracker");

        let grace = self.config.shutdown_grace();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for mut task in tasks {
            if timeout(grace, &mut task).await.is_err() {
                warn!("Task did not stop within {:?}, aborting", grace);
                task.abort();
            }
        }

        if let Err(e) = self.store.close().await {
            error!("Failed to close store: {}", e);
        }
        info!("Tracker stopped");
    }
}
