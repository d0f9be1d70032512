use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    abi::{parse_abi, Abi},
    contract::{Contract, ContractError},
    providers::{Http, Middleware, Provider, ProviderError},
    types::{Address, U256},
    utils::to_checksum,
};
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    errors::CustomError,
    models::{
        balance::{NormalizedBalance, TokenBalance},
        chain::Chain,
    },
};

use super::{retry::RetryPolicy, token_metadata::resolve_erc20, units::format_units};

// ERC20 metadata reads; balances come from alchemy_getTokenBalances
const ERC20_ABI: [&str; 3] = [
    "function decimals() view returns (uint8)",
    "function symbol() view returns (string)",
    "function name() view returns (string)",
];

/// A non-native holding reported by the provider, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTokenBalance {
    pub contract_address: Address,
    pub balance: U256,
}

/// Upstream calls the Ethereum adapter relies on.
#[async_trait]
pub trait EthereumRpc: Send + Sync {
    async fn get_balance(&self, owner: Address) -> Result<U256, CustomError>;
    async fn get_token_balances(&self, owner: Address) -> Result<Vec<RawTokenBalance>, CustomError>;
    async fn erc20_decimals(&self, token: Address) -> Result<u8, CustomError>;
    async fn erc20_symbol(&self, token: Address) -> Result<String, CustomError>;
    async fn erc20_name(&self, token: Address) -> Result<String, CustomError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlchemyTokenBalances {
    token_balances: Vec<AlchemyTokenBalance>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlchemyTokenBalance {
    contract_address: Address,
    token_balance: Option<String>,
    error: Option<serde_json::Value>,
}

/// JSON-RPC client against an Alchemy mainnet endpoint.
#[derive(Clone, Debug)]
pub struct AlchemyClient {
    provider: Arc<Provider<Http>>,
    erc20: Abi,
    api_key: String,
}

impl AlchemyClient {
    pub fn new(rpc_url: &str, api_key: &str) -> Result<Self, CustomError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| CustomError::ConfigError(format!("Invalid Ethereum RPC URL: {}", e)))?;
        let erc20 = parse_abi(&ERC20_ABI)
            .map_err(|e| CustomError::ConfigError(format!("Invalid ERC20 ABI: {}", e)))?;

        Ok(Self {
            provider: Arc::new(provider),
            erc20,
            api_key: api_key.to_string(),
        })
    }

    fn contract(&self, token: Address) -> Contract<Provider<Http>> {
        Contract::new(token, self.erc20.clone(), self.provider.clone())
    }

    /// Classifies on the provider error itself, then adds call context.
    fn upstream_error(&self, err: ProviderError, context: impl std::fmt::Display) -> CustomError {
        CustomError::from(err)
            .context(context)
            .redacted(&[self.api_key.as_str()])
    }

    async fn call_view<D>(&self, token: Address, method: &str) -> Result<D, CustomError>
    where
        D: ethers::abi::Detokenize + Send + Sync,
    {
        self.contract(token)
            .method::<_, D>(method, ())
            .map_err(|e| CustomError::MetadataUnavailable(e.to_string()))?
            .call()
            .await
            .map_err(|e| {
                let context = format!("{}() on {:?}", method, token);
                match e {
                    ContractError::MiddlewareError { e } | ContractError::ProviderError { e } => {
                        self.upstream_error(e, context)
                    }
                    other => CustomError::upstream(other.to_string())
                        .context(context)
                        .redacted(&[self.api_key.as_str()]),
                }
            })
    }
}

#[async_trait]
impl EthereumRpc for AlchemyClient {
    async fn get_balance(&self, owner: Address) -> Result<U256, CustomError> {
        self.provider
            .get_balance(owner, None)
            .await
            .map_err(|e| self.upstream_error(e, "eth_getBalance"))
    }

    async fn get_token_balances(
        &self,
        owner: Address,
    ) -> Result<Vec<RawTokenBalance>, CustomError> {
        let response: AlchemyTokenBalances = self
            .provider
            .request("alchemy_getTokenBalances", (owner, "erc20"))
            .await
            .map_err(|e| self.upstream_error(e, "alchemy_getTokenBalances"))?;

        let mut balances = Vec::with_capacity(response.token_balances.len());
        for entry in response.token_balances {
            if let Some(err) = entry.error {
                debug!("Skipping token {:?} reported with error: {}", entry.contract_address, err);
                continue;
            }
            let balance = parse_hex_quantity(entry.token_balance.as_deref().unwrap_or("0x0"))?;
            balances.push(RawTokenBalance {
                contract_address: entry.contract_address,
                balance,
            });
        }
        Ok(balances)
    }

    async fn erc20_decimals(&self, token: Address) -> Result<u8, CustomError> {
        self.call_view(token, "decimals").await
    }

    async fn erc20_symbol(&self, token: Address) -> Result<String, CustomError> {
        self.call_view(token, "symbol").await
    }

    async fn erc20_name(&self, token: Address) -> Result<String, CustomError> {
        self.call_view(token, "name").await
    }
}

fn parse_hex_quantity(raw: &str) -> Result<U256, CustomError> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| CustomError::upstream(format!("Invalid token balance {}: {}", raw, e)))
}

/// Accepts `0x`-prefixed 40-hex-digit addresses. Mixed-case input must carry
/// a valid EIP-55 checksum.
pub fn parse_address(address: &str) -> Result<Address, CustomError> {
    let invalid =
        || CustomError::InvalidAddressError(format!("Invalid Ethereum address: {}", address));

    let hex = address.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let parsed = Address::from_str(hex).map_err(|_| invalid())?;
    let mixed_case =
        hex.chars().any(|c| c.is_ascii_lowercase()) && hex.chars().any(|c| c.is_ascii_uppercase());
    if mixed_case && to_checksum(&parsed, None) != address {
        return Err(invalid());
    }
    Ok(parsed)
}

pub struct EthereumAdapter {
    rpc: Arc<dyn EthereumRpc>,
    retry: RetryPolicy,
}

impl EthereumAdapter {
    pub fn new(rpc: Arc<dyn EthereumRpc>, retry: RetryPolicy) -> Self {
        Self { rpc, retry }
    }

    pub async fn fetch_balance(&self, address: &str) -> Result<NormalizedBalance, CustomError> {
        let owner = parse_address(address)?;

        let wei = self
            .retry
            .run("eth_getBalance", || self.rpc.get_balance(owner))
            .await?;

        let held: Vec<RawTokenBalance> = self
            .retry
            .run("alchemy_getTokenBalances", || self.rpc.get_token_balances(owner))
            .await?
            .into_iter()
            .filter(|token| !token.balance.is_zero())
            .collect();

        let tokens = join_all(held.iter().map(|token| self.describe_token(token)))
            .await
            .into_iter()
            .flatten()
            .collect();

        Ok(NormalizedBalance::new(
            Chain::Ethereum,
            &format_units(wei, Chain::Ethereum.native_decimals()),
            tokens,
        ))
    }

    /// A token whose decimals cannot be read is dropped, not fatal. Missing
    /// symbol or name only leaves those fields empty.
    async fn describe_token(&self, token: &RawTokenBalance) -> Option<TokenBalance> {
        match resolve_erc20(self.rpc.as_ref(), &self.retry, token.contract_address).await {
            Ok(metadata) => {
                let mut balance = TokenBalance::new(
                    to_checksum(&token.contract_address, None),
                    format_units(token.balance, metadata.decimals),
                );
                balance.name = metadata.name;
                balance.symbol = metadata.symbol;
                Some(balance)
            }
            Err(e) => {
                warn!(
                    "Dropping ERC20 token {:?}, metadata lookup failed: {}",
                    token.contract_address, e
                );
                None
            }
        }
    }
}
