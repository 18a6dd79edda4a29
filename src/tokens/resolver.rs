use dashmap::DashMap;
use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::api::{AssetMetadata, MetadataApi};
use crate::error::Error;
use crate::models::{BlacklistKind, Token, UNKNOWN_TOKEN_NAME, UNKNOWN_TOKEN_SYMBOL};
use crate::store::Store;
use crate::utils::{Blacklist, RateLimiter, TokenCache};

/// Resolves mint addresses into shared [`Token`] instances.
///
/// This is the only component that talks to the metadata API. Every distinct
/// mint costs at most one remote call per process lifetime; failures degrade
/// into the unknown-token sentinel and never reach the caller.
pub struct TokenResolver {
    api: Arc<dyn MetadataApi>,
    store: Arc<dyn Store>,
    cache: Arc<TokenCache>,
    blacklist: Arc<Blacklist>,
    permits: Arc<Semaphore>,
    limiter: RateLimiter,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenResolver {
    pub fn new(
        api: Arc<dyn MetadataApi>,
        store: Arc<dyn Store>,
        cache: Arc<TokenCache>,
        blacklist: Arc<Blacklist>,
        max_concurrent: usize,
        requests_per_second: u32,
    ) -> Self {
        Self {
            api,
            store,
            cache,
            blacklist,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            limiter: RateLimiter::per_second("metadata", requests_per_second),
            inflight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub async fn resolve(&self, mint: &str) -> Arc<Token> {
        if let Some(token) = self.cache.get(mint) {
            return token;
        }

        if self.blacklist.contains(mint) {
            debug!("{} is blacklisted for metadata, using placeholder", mint);
            return self.cache.get_or_insert_with(mint, || Token::unknown(mint));
        }

        // Concurrent callers for the same mint queue here and find the cache
        // filled once the first one is done.
        let gate = Arc::clone(
            self.inflight
                .entry(mint.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = gate.lock().await;

        let resolved = match self.cache.get(mint) {
            Some(token) => token,
            None => self.fetch_and_store(mint).await,
        };

        drop(guard);
        self.inflight.remove(mint);
        resolved
    }

    async fn fetch_and_store(&self, mint: &str) -> Arc<Token> {
        let metadata = {
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Metadata permits closed: {}", e);
                    return Arc::new(Token::unknown(mint));
                }
            };
            self.limiter.acquire().await;
            self.api.get_asset_metadata(mint).await
        };

        let token = match metadata {
            Ok(metadata) => token_from_metadata(mint, metadata),
            Err(Error::RateLimitExceeded(msg)) => {
                // Transient: retried on the next resolve for this mint.
                warn!("Metadata lookup for {} rate limited: {}", mint, msg);
                return Arc::new(Token::unknown(mint));
            }
            Err(e) => {
                warn!("Metadata lookup for {} failed: {}", mint, e);
                Token::unknown(mint)
            }
        };

        let token = self.cache.insert(Arc::new(token));
        if let Err(e) = self.store.upsert_token(&token).await {
            error!("Failed to persist token {}: {}", mint, e);
        }

        if token.is_unknown() && self.blacklist.insert(mint) {
            warn!("Blacklisting unresolvable mint {}", mint);
            if let Err(e) = self
                .store
                .upsert_blacklist_entry(BlacklistKind::Metadata, mint)
                .await
            {
                error!("Failed to persist metadata blacklist entry {}: {}", mint, e);
            }
        }

        token
    }
}

fn token_from_metadata(mint: &str, metadata: AssetMetadata) -> Token {
    Token::new(
        mint,
        metadata.name.unwrap_or_else(|| UNKNOWN_TOKEN_NAME.to_string()),
        metadata
            .symbol
            .unwrap_or_else(|| UNKNOWN_TOKEN_SYMBOL.to_string()),
        metadata.decimals.unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockMetadataApi;
    use crate::store::{MemoryStore, MockStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::task::JoinSet;

    /// Metadata API that takes a while to answer and records how many calls
    /// were in flight at once.
    #[derive(Default)]
    struct SlowMetadata {
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetadataApi for SlowMetadata {
        async fn get_asset_metadata(&self, _mint: &str) -> crate::error::Result<AssetMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(usdc_metadata())
        }
    }

    fn resolver_with(api: MockMetadataApi) -> (TokenResolver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let resolver = TokenResolver::new(
            Arc::new(api),
            store.clone(),
            Arc::new(TokenCache::new()),
            Arc::new(Blacklist::new(BlacklistKind::Metadata)),
            5,
            100,
        );
        (resolver, store)
    }

    fn usdc_metadata() -> AssetMetadata {
        AssetMetadata {
            name: Some("USD Coin".to_string()),
            symbol: Some("USDC".to_string()),
            decimals: Some(6),
        }
    }

    #[tokio::test]
    async fn test_resolve_twice_hits_api_once() {
        let mut api = MockMetadataApi::new();
        api.expect_get_asset_metadata()
            .times(1)
            .returning(|_| Ok(usdc_metadata()));
        let (resolver, store) = resolver_with(api);

        let first = resolver.resolve("usdc").await;
        let second = resolver.resolve("usdc").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.symbol(), "USDC");
        assert_eq!(first.decimals(), 6);
        assert_eq!(store.token_writes(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_call() {
        let mut api = MockMetadataApi::new();
        api.expect_get_asset_metadata()
            .times(1)
            .returning(|_| Ok(usdc_metadata()));
        let (resolver, _store) = resolver_with(api);

        let (a, b, c) = tokio::join!(
            resolver.resolve("usdc"),
            resolver.resolve("usdc"),
            resolver.resolve("usdc")
        );
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn test_blacklisted_mint_makes_no_call() {
        let mut api = MockMetadataApi::new();
        api.expect_get_asset_metadata().times(0);
        let (resolver, store) = resolver_with(api);
        resolver.blacklist().insert("bad");

        let token = resolver.resolve("bad").await;
        assert!(token.is_unknown());
        assert_eq!(token.decimals(), 0);
        assert!(Arc::ptr_eq(&token, &resolver.resolve("bad").await));
        assert_eq!(store.token_writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_lookup_yields_blacklisted_sentinel() {
        let mut api = MockMetadataApi::new();
        api.expect_get_asset_metadata()
            .times(1)
            .returning(|_| Err(Error::ApiError("boom".to_string())));
        let (resolver, store) = resolver_with(api);

        let token = resolver.resolve("broken").await;
        assert_eq!(token.name(), UNKNOWN_TOKEN_NAME);
        assert_eq!(token.symbol(), UNKNOWN_TOKEN_SYMBOL);
        assert_eq!(token.decimals(), 0);
        assert!(resolver.blacklist().contains("broken"));
        assert!(store.blacklisted(BlacklistKind::Metadata, "broken"));
        assert!(store.token("broken").is_some());

        // Cached now, no second call.
        resolver.resolve("broken").await;
    }

    #[tokio::test]
    async fn test_missing_name_is_treated_as_unresolvable() {
        let mut api = MockMetadataApi::new();
        api.expect_get_asset_metadata().times(1).returning(|_| {
            Ok(AssetMetadata {
                name: None,
                symbol: Some("ODD".to_string()),
                decimals: Some(9),
            })
        });
        let (resolver, _store) = resolver_with(api);

        let token = resolver.resolve("odd").await;
        assert!(token.is_unknown());
        assert_eq!(token.symbol(), "ODD");
        assert_eq!(token.decimals(), 9);
        assert!(resolver.blacklist().contains("odd"));
    }

    #[tokio::test]
    async fn test_rate_limited_lookup_is_not_cached() {
        let mut api = MockMetadataApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_get_asset_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::RateLimitExceeded("429".to_string())));
        api.expect_get_asset_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(usdc_metadata()));
        let (resolver, store) = resolver_with(api);

        let first = resolver.resolve("usdc").await;
        assert!(first.is_unknown());
        assert!(!resolver.blacklist().contains("usdc"));
        assert!(!resolver.cache().contains("usdc"));
        assert_eq!(store.token_writes(), 0);

        let second = resolver.resolve("usdc").await;
        assert_eq!(second.name(), "USD Coin");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permits_bound_calls_in_flight() {
        let api = Arc::new(SlowMetadata::default());
        let resolver = Arc::new(TokenResolver::new(
            api.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(TokenCache::new()),
            Arc::new(Blacklist::new(BlacklistKind::Metadata)),
            3,
            1000,
        ));

        let mut tasks = JoinSet::new();
        for i in 0..12 {
            let resolver = Arc::clone(&resolver);
            tasks.spawn(async move { resolver.resolve(&format!("mint{:02}", i)).await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(!joined.unwrap().is_unknown());
        }

        assert_eq!(api.calls.load(Ordering::SeqCst), 12);
        assert_eq!(api.peak.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.cache().len(), 12);
    }

    #[tokio::test]
    async fn test_store_failures_do_not_reach_caller() {
        let mut api = MockMetadataApi::new();
        api.expect_get_asset_metadata()
            .times(1)
            .returning(|_| Err(Error::ApiError("boom".to_string())));
        let mut store = MockStore::new();
        store
            .expect_upsert_token()
            .times(1)
            .returning(|_| Err(Error::DatabaseError("connection reset".to_string())));
        store
            .expect_upsert_blacklist_entry()
            .times(1)
            .returning(|_, _| Err(Error::DatabaseError("connection reset".to_string())));
        let resolver = TokenResolver::new(
            Arc::new(api),
            Arc::new(store),
            Arc::new(TokenCache::new()),
            Arc::new(Blacklist::new(BlacklistKind::Metadata)),
            5,
            100,
        );

        let token = resolver.resolve("broken").await;
        assert!(token.is_unknown());
        assert!(resolver.cache().contains("broken"));
        assert!(resolver.blacklist().contains("broken"));
        assert!(Arc::ptr_eq(&token, &resolver.resolve("broken").await));
    }
}
