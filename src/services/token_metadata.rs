use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{
    errors::CustomError,
    models::token::{
        Erc20Metadata, TokenListDocument, TokenListEntry, TokenMetadata, SOLANA_MAINNET_CHAIN_ID,
    },
};

use super::{ethereum::EthereumRpc, retry::RetryPolicy};

pub const DEFAULT_TOKEN_LIST_URL: &str =
    "https://raw.githubusercontent.com/solana-labs/token-list/main/src/tokens/solana.tokenlist.json";

/// Source of the public Solana token reference list.
#[async_trait]
pub trait TokenListSource: Send + Sync {
    async fn fetch_token_list(&self) -> Result<Vec<TokenListEntry>, CustomError>;
}

pub struct HttpTokenList {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenList {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenListSource for HttpTokenList {
    async fn fetch_token_list(&self) -> Result<Vec<TokenListEntry>, CustomError> {
        let document: TokenListDocument = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(document
            .tokens
            .into_iter()
            .filter(|t| t.chain_id.map_or(true, |id| id == SOLANA_MAINNET_CHAIN_ID))
            .collect())
    }
}

type MintIndex = Arc<HashMap<String, TokenMetadata>>;

struct LoadedList {
    by_mint: MintIndex,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<Instant>,
}

impl LoadedList {
    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Resolves Solana mint metadata from the token list, kept parsed and indexed
/// by mint for the configured TTL. Lookups never fail: a missing list or
/// mint yields [`TokenMetadata::unknown`].
#[derive(Clone)]
pub struct TokenMetadataResolver {
    source: Arc<dyn TokenListSource>,
    loaded: Arc<RwLock<Option<LoadedList>>>,
    retry: RetryPolicy,
    ttl: Duration,
}

impl TokenMetadataResolver {
    pub fn new(source: Arc<dyn TokenListSource>, retry: RetryPolicy, ttl: Duration) -> Self {
        Self {
            source,
            loaded: Arc::new(RwLock::new(None)),
            retry,
            ttl,
        }
    }

    pub async fn resolve(&self, mint: &str) -> TokenMetadata {
        self.resolve_all(&[mint.to_string()])
            .await
            .pop()
            .unwrap_or_else(TokenMetadata::unknown)
    }

    /// Resolves several mints against a single read of the index, returning
    /// results in input order.
    pub async fn resolve_all(&self, mints: &[String]) -> Vec<TokenMetadata> {
        if mints.is_empty() {
            return Vec::new();
        }

        let index = match self.index().await {
            Ok(index) => Some(index),
            Err(e) => {
                warn!("Token list unavailable, using fallback metadata: {}", e);
                None
            }
        };

        mints
            .iter()
            .map(|mint| match index.as_ref().and_then(|i| i.get(mint)) {
                Some(metadata) => metadata.clone(),
                None => {
                    debug!("Mint {} not in token list", mint);
                    TokenMetadata::unknown()
                }
            })
            .collect()
    }

    /// Returns the fresh index, downloading the list if needed. Concurrent
    /// callers wait on the write lock so the list is fetched once. When a
    /// refresh fails the previous index is kept.
    async fn index(&self) -> Result<MintIndex, CustomError> {
        if let Some(list) = self.loaded.read().await.as_ref().filter(|l| l.is_fresh()) {
            return Ok(list.by_mint.clone());
        }

        let mut loaded = self.loaded.write().await;
        if let Some(list) = loaded.as_ref().filter(|l| l.is_fresh()) {
            return Ok(list.by_mint.clone());
        }

        let entries = match self
            .retry
            .run("fetch_token_list", || self.source.fetch_token_list())
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                return match loaded.as_ref() {
                    Some(stale) => {
                        warn!("Token list refresh failed, keeping previous list: {}", e);
                        Ok(stale.by_mint.clone())
                    }
                    None => Err(CustomError::MetadataUnavailable(e.to_string())),
                }
            }
        };

        let by_mint: MintIndex = Arc::new(
            entries
                .iter()
                .map(|entry| (entry.address.clone(), TokenMetadata::from(entry)))
                .collect(),
        );
        info!("Loaded Solana token list with {} mints", by_mint.len());

        *loaded = Some(LoadedList {
            by_mint: by_mint.clone(),
            expires_at: Instant::now().checked_add(self.ttl),
        });
        Ok(by_mint)
    }
}

/// Reads decimals, symbol and name from an ERC20 contract, each call retried
/// on its own. Only a failed `decimals()` is an error.
pub async fn resolve_erc20(
    rpc: &dyn EthereumRpc,
    retry: &RetryPolicy,
    contract: Address,
) -> Result<Erc20Metadata, CustomError> {
    let decimals = retry
        .run("erc20_decimals", || rpc.erc20_decimals(contract))
        .await
        .map_err(|e| CustomError::MetadataUnavailable(format!("{:?}: {}", contract, e)))?;

    let optional = |field: &str, result: Result<String, CustomError>| match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("No {} for ERC20 {:?}: {}", field, contract, e);
            None
        }
    };

    let symbol = optional(
        "symbol",
        retry.run("erc20_symbol", || rpc.erc20_symbol(contract)).await,
    );
    let name = optional(
        "name",
        retry.run("erc20_name", || rpc.erc20_name(contract)).await,
    );

    Ok(Erc20Metadata {
        decimals: u32::from(decimals),
        symbol,
        name,
    })
}
