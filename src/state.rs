use std::sync::Arc;

use crate::{
    config::Config,
    errors::CustomError,
    services::{
        balance_service::{BalanceAggregator, ChainAdapters},
        bitcoin::{BitcoinAdapter, BlockCypherClient},
        cache::ResponseCache,
        ethereum::{AlchemyClient, EthereumAdapter},
        price_service::{CoinGeckoClient, PriceService},
        solana::{SolanaAdapter, SolanaRpcClient},
        token_metadata::{HttpTokenList, TokenMetadataResolver},
    },
};

/// Shared handles for the HTTP handlers. Cloning is cheap; every field is
/// reference counted internally.
#[derive(Clone)]
pub struct AppState {
    /// Cached, single-flight balance lookups.
    pub balances: BalanceAggregator,
    /// USD valuation for the portfolio endpoint.
    pub prices: PriceService,
    /// The cache backing both of the above, kept for the pruner.
    pub cache: ResponseCache,
}

impl AppState {
    pub fn new(balances: BalanceAggregator, prices: PriceService, cache: ResponseCache) -> Self {
        Self {
            balances,
            prices,
            cache,
        }
    }

    /// Wires the real upstream clients. One `reqwest::Client` is shared so
    /// connections are pooled across providers.
    pub fn from_config(config: &Config) -> Result<Self, CustomError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CustomError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let cache = ResponseCache::new(config.stale_grace);
        let retry = config.retry;

        let resolver = TokenMetadataResolver::new(
            Arc::new(HttpTokenList::new(http.clone(), config.token_list_url.clone())),
            retry,
            config.token_list_ttl,
        );

        let adapters = ChainAdapters {
            ethereum: EthereumAdapter::new(
                Arc::new(AlchemyClient::new(&config.ethereum_rpc_url, &config.alchemy_api_key)?),
                retry,
            ),
            bitcoin: BitcoinAdapter::new(
                Arc::new(BlockCypherClient::new(
                    http.clone(),
                    config.blockcypher_base_url.clone(),
                    config.blockcypher_token.clone(),
                )),
                retry,
            ),
            solana: SolanaAdapter::new(
                Arc::new(SolanaRpcClient::new(http.clone(), config.solana_rpc_url.clone())),
                resolver,
                retry,
            ),
        };

        let prices = PriceService::new(
            Arc::new(CoinGeckoClient::new(http, config.coingecko_url.clone())),
            cache.clone(),
            retry,
            config.price_ttl,
        );

        Ok(Self::new(
            BalanceAggregator::new(adapters, cache.clone(), config.balance_ttl),
            prices,
            cache,
        ))
    }
}
