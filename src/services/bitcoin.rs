use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::{
    errors::CustomError,
    models::{balance::NormalizedBalance, chain::Chain},
};

use super::{retry::RetryPolicy, units::format_units};

pub const DEFAULT_BLOCKCYPHER_URL: &str = "https://api.blockcypher.com/v1/btc/main";

// Longest bech32 string is 90 characters
const MAX_ADDRESS_LEN: usize = 90;

/// Block explorer returning an address balance in satoshis.
#[async_trait]
pub trait BitcoinExplorer: Send + Sync {
    async fn address_balance(&self, address: &str) -> Result<u64, CustomError>;
}

#[derive(Debug, Deserialize)]
struct AddressBalance {
    balance: u64,
}

pub struct BlockCypherClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl BlockCypherClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// `{base}/addrs/{address}/balance` with the address pushed as one
    /// escaped path segment.
    fn balance_url(&self, address: &str) -> Result<Url, CustomError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CustomError::ConfigError(format!("Invalid BlockCypher URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| CustomError::ConfigError("BlockCypher URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["addrs", address, "balance"]);
        Ok(url)
    }
}

#[async_trait]
impl BitcoinExplorer for BlockCypherClient {
    async fn address_balance(&self, address: &str) -> Result<u64, CustomError> {
        let response: AddressBalance = self
            .client
            .get(self.balance_url(address)?)
            .query(&[("token", self.token.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.balance)
    }
}

/// Full address validation is left to the explorer, which rejects malformed
/// input. Only the character set is checked here: base58 and bech32 are both
/// plain ASCII alphanumerics.
pub fn check_address_charset(address: &str) -> Result<(), CustomError> {
    if address.is_empty()
        || address.len() > MAX_ADDRESS_LEN
        || !address.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(CustomError::InvalidAddressError(format!(
            "Invalid Bitcoin address: {}",
            address
        )));
    }
    Ok(())
}

/// Bitcoin has no token model so `tokens` is always empty.
pub struct BitcoinAdapter {
    explorer: Arc<dyn BitcoinExplorer>,
    retry: RetryPolicy,
}

impl BitcoinAdapter {
    pub fn new(explorer: Arc<dyn BitcoinExplorer>, retry: RetryPolicy) -> Self {
        Self { explorer, retry }
    }

    pub async fn fetch_balance(&self, address: &str) -> Result<NormalizedBalance, CustomError> {
        check_address_charset(address)?;

        let satoshis = self
            .retry
            .run("blockcypher_balance", || self.explorer.address_balance(address))
            .await?;

        Ok(NormalizedBalance::new(
            Chain::Bitcoin,
            &format_units(satoshis, Chain::Bitcoin.native_decimals()),
            Vec::new(),
        ))
    }
}
