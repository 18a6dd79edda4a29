use anyhow::Result;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use wallet_tracker::api::{HeliusClient, JupiterPriceClient};
use wallet_tracker::cli::Cli;
use wallet_tracker::config::{Config, DEFAULT_CONFIG_PATH};
use wallet_tracker::logging;
use wallet_tracker::models::Wallet;
use wallet_tracker::solana::SolanaRpcClient;
use wallet_tracker::store::{MemoryStore, PgStore, Store};
use wallet_tracker::tracker::{Tracker, TrackerEvent};
use wallet_tracker::validation::parse_wallet_input;

fn log_wallet(wallet: &Wallet) {
    info!(
        "{} ({}): {:.4} SOL, {} positions, ${:.2}",
        wallet.name(),
        wallet.address(),
        wallet.native_balance(),
        wallet.position_count(),
        wallet.total_usd()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = match Config::load_or_default(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(anyhow::anyhow!("Configuration loading failed: {}", e));
        }
    };

    let level = if cli.debug { LevelFilter::Debug } else { LevelFilter::Info };
    match &config.logging.file {
        Some(path) => logging::init(path, level)?,
        None => env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .init(),
    }

    info!("Starting wallet tracker...");

    let timeout = config.api.request_timeout();
    let chain = Arc::new(SolanaRpcClient::new(config.solana.rpc_url.clone(), timeout)?);
    if config.api.helius_api_key.is_empty() {
        warn!("No Helius API key configured, metadata lookups will likely fail");
    }
    let metadata = Arc::new(HeliusClient::new(
        config.api.helius_url.clone(),
        config.api.helius_api_key.clone(),
        timeout,
    )?);
    let prices = Arc::new(JupiterPriceClient::new(config.api.jupiter_price_url.clone(), timeout)?);

    let store: Arc<dyn Store> = match &config.database {
        Some(db) => Arc::new(PgStore::connect(&db.url, db.max_connections).await?),
        None => {
            info!("No database configured, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let tracker = Arc::new(Tracker::new(
        config.tracker.clone(),
        chain,
        metadata,
        prices,
        store,
    ));
    tracker.load_state().await?;

    let mut events = tracker.subscribe();
    tracker.start();

    for input in &cli.wallets {
        match parse_wallet_input(input) {
            Ok((name, address)) => match tracker.add_wallet(&name, &address).await {
                Ok(_) => {}
                Err(e) => error!("Could not add wallet {}: {}", input, e),
            },
            Err(e) => error!("Invalid --wallet value: {}", e),
        }
    }

    let overlap_min_usd = config.tracker.overlap_min_usd;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TrackerEvent::WalletLoaded(wallet)) => log_wallet(&wallet),
                Ok(TrackerEvent::WalletsLoaded { count }) => {
                    info!("{} stored wallets loaded", count);
                }
                Ok(TrackerEvent::MarketDataUpdated(summary)) => {
                    if summary.completed() {
                        for wallet in tracker.list_wallets() {
                            log_wallet(&wallet);
                        }
                        for overlap in tracker.overlapping_tokens(overlap_min_usd) {
                            info!(
                                "{} ({}) held by {} wallets, ${:.2} total",
                                overlap.token.name(),
                                overlap.token.symbol(),
                                overlap.holders.len(),
                                overlap.total_usd
                            );
                        }
                    }
                }
                Ok(TrackerEvent::PositionsRevalued(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} tracker events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C");
                break;
            }
        }
    }

    tracker.shutdown().await;
    Ok(())
}
