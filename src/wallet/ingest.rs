use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

use crate::models::{Position, Wallet, WalletState};
use crate::solana::{ChainRpc, TokenAccount};
use crate::store::Store;
use crate::tokens::TokenResolver;

/// Wallets by address.
pub type WalletMap = DashMap<String, Arc<Wallet>>;

/// Discovers a wallet's token accounts and turns them into positions.
///
/// Each nonzero token account is resolved in its own task; the metadata
/// semaphore inside [`TokenResolver`] is what actually bounds the fan-out.
pub struct WalletIngestionPipeline {
    chain: Arc<dyn ChainRpc>,
    resolver: Arc<TokenResolver>,
    store: Arc<dyn Store>,
    wallets: Arc<WalletMap>,
    shutdown: watch::Receiver<bool>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl WalletIngestionPipeline {
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        resolver: Arc<TokenResolver>,
        store: Arc<dyn Store>,
        wallets: Arc<WalletMap>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chain,
            resolver,
            store,
            wallets,
            shutdown,
            inflight: DashMap::new(),
        }
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Ingests (or re-ingests) a wallet. Returns `None` only when the wallet is
    /// new and its account lookup failed.
    ///
    /// Calls for the same address run one at a time. A call that finds a first
    /// load of the same new wallet already running waits for it and returns
    /// its wallet instead of loading again.
    pub async fn ingest(&self, address: &str, name: &str) -> Option<Arc<Wallet>> {
        let gate = Arc::clone(
            self.inflight
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = match gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let was_tracked = self.wallets.contains_key(address);
                let guard = gate.lock().await;
                if !was_tracked {
                    if let Some(wallet) = self.wallets.get(address) {
                        debug!("{} was loaded by a concurrent call", address);
                        return Some(Arc::clone(wallet.value()));
                    }
                }
                guard
            }
        };

        let wallet = self.ingest_exclusive(address, name).await;
        drop(guard);
        self.inflight.remove(address);
        wallet
    }

    async fn ingest_exclusive(&self, address: &str, name: &str) -> Option<Arc<Wallet>> {
        let existing = self.wallets.get(address).map(|w| Arc::clone(w.value()));

        let account = match self.chain.get_account_info(address).await {
            Ok(Some(account)) => Some(account),
            Ok(None) => {
                warn!("Account {} not found on chain", address);
                None
            }
            Err(e) => {
                warn!("Account lookup for {} failed: {}", address, e);
                None
            }
        };

        let wallet = match (existing, account) {
            (Some(wallet), Some(account)) => {
                wallet.set_native_balance(account.lamports);
                wallet
            }
            (Some(wallet), None) => {
                warn!("Keeping previous SOL balance for {}", address);
                wallet
            }
            (None, Some(account)) => Arc::new(Wallet::new(address, name, account.lamports)),
            (None, None) => return None,
        };

        if let Err(e) = self.store.upsert_wallet(&wallet).await {
            error!("Failed to persist wallet {}: {}", address, e);
        }

        self.load_positions(&wallet).await;

        let stored = Arc::clone(
            self.wallets
                .entry(address.to_string())
                .or_insert_with(|| Arc::clone(&wallet))
                .value(),
        );
        info!(
            "Loaded wallet {} ({}) with {} positions",
            stored.name(),
            address,
            stored.position_count()
        );
        Some(stored)
    }

    async fn load_positions(&self, wallet: &Arc<Wallet>) {
        let accounts = match self.chain.get_token_accounts_by_owner(wallet.address()).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(
                    "Token account lookup for {} failed, keeping {} previous positions: {}",
                    wallet.address(),
                    wallet.position_count(),
                    e
                );
                wallet.set_state(WalletState::PositionsResolved);
                return;
            }
        };

        let held: Vec<TokenAccount> = accounts.into_iter().filter(|a| a.raw_amount > 0).collect();
        debug!("{} holds {} nonzero token accounts", wallet.address(), held.len());
        wallet.set_state(WalletState::PositionsResolving);

        let mut units = JoinSet::new();
        let mut interrupted = false;
        for account in &held {
            if self.is_shutting_down() {
                info!("Shutdown requested, stopping ingestion of {}", wallet.address());
                interrupted = true;
                break;
            }
            let resolver = Arc::clone(&self.resolver);
            let wallet = Arc::clone(wallet);
            let account = account.clone();
            units.spawn(async move {
                let token = resolver.resolve(&account.mint).await;
                let position = Position::new(wallet.address(), account.address, token, account.raw_amount);
                position.revalue();
                wallet.insert_position(Arc::new(position));
            });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                error!("Position task for {} failed: {}", wallet.address(), e);
            }
        }

        if !interrupted {
            let current: HashSet<String> = held.into_iter().map(|a| a.address).collect();
            let removed = wallet.retain_positions(&current);
            if removed > 0 {
                info!("Dropped {} divested positions from {}", removed, wallet.address());
            }
        }
        wallet.set_state(WalletState::PositionsResolved);
    }
}
