use std::sync::Arc;
use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};

use crate::{
    errors::CustomError,
    models::{
        balance::{BalanceQuery, NormalizedBalance},
        chain::Chain,
    },
};

use super::{
    bitcoin::BitcoinAdapter, cache::ResponseCache, ethereum::EthereumAdapter,
    solana::SolanaAdapter,
};

type SharedFetch = Shared<BoxFuture<'static, Result<NormalizedBalance, CustomError>>>;

/// One adapter per supported chain.
pub struct ChainAdapters {
    pub ethereum: EthereumAdapter,
    pub bitcoin: BitcoinAdapter,
    pub solana: SolanaAdapter,
}

impl ChainAdapters {
    pub async fn fetch_balance(
        &self,
        chain: Chain,
        address: &str,
    ) -> Result<NormalizedBalance, CustomError> {
        match chain {
            Chain::Ethereum => self.ethereum.fetch_balance(address).await,
            Chain::Bitcoin => self.bitcoin.fetch_balance(address).await,
            Chain::Solana => self.solana.fetch_balance(address).await,
        }
    }
}

/// Entry point for balance lookups: cache first, then one upstream fetch per
/// cache key no matter how many callers are waiting on it.
#[derive(Clone)]
pub struct BalanceAggregator {
    adapters: Arc<ChainAdapters>,
    cache: ResponseCache,
    ttl: Duration,
    in_flight: Arc<DashMap<String, SharedFetch>>,
}

impl BalanceAggregator {
    pub fn new(adapters: ChainAdapters, cache: ResponseCache, ttl: Duration) -> Self {
        Self {
            adapters: Arc::new(adapters),
            cache,
            ttl,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub async fn get_balance(
        &self,
        query: &BalanceQuery,
    ) -> Result<NormalizedBalance, CustomError> {
        if query.address.trim().is_empty() {
            return Err(CustomError::ValidationError(
                "Blockchain and address are required".to_string(),
            ));
        }

        let key = query.cache_key();
        if let Some(cached) = self.cache.get::<NormalizedBalance>(&key) {
            debug!("Serving {} from cache", key);
            return Ok(cached);
        }

        let fetch = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(pending) => {
                debug!("Joining in-flight fetch for {}", key);
                pending.get().clone()
            }
            Entry::Vacant(slot) => {
                let fetch = self.spawn_fetch(query.clone(), key);
                slot.insert(fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// The fetch runs as its own task so it completes and fills the cache
    /// even if every caller goes away.
    fn spawn_fetch(&self, query: BalanceQuery, key: String) -> SharedFetch {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _slot = InFlightSlot {
                in_flight: this.in_flight.clone(),
                key: key.clone(),
            };
            this.fetch_uncached(&query, &key).await
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(CustomError::upstream(format!("Balance task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }

    async fn fetch_uncached(
        &self,
        query: &BalanceQuery,
        key: &str,
    ) -> Result<NormalizedBalance, CustomError> {
        info!("Fetching {} balance for {}", query.chain, query.address);

        match self.adapters.fetch_balance(query.chain, &query.address).await {
            Ok(balance) => {
                self.cache.set(key, &balance, self.ttl);
                Ok(balance)
            }
            Err(e) if e.is_bad_request() => Err(e),
            Err(e) if e.is_rate_limited() => match self.cache.get_stale::<NormalizedBalance>(key) {
                Some(stale) => {
                    warn!("Rate limited fetching {}, serving stale snapshot", key);
                    Ok(stale)
                }
                None => Err(e.into_upstream()),
            },
            Err(e) => Err(e.into_upstream()),
        }
    }
}

/// Clears the in-flight entry when the fetch task ends, including by panic,
/// so the next request for the key starts a fresh fetch.
struct InFlightSlot {
    in_flight: Arc<DashMap<String, SharedFetch>>,
    key: String,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
