use std::str::FromStr;
use std::time::Duration;

use crate::{
    errors::CustomError,
    services::{
        bitcoin::DEFAULT_BLOCKCYPHER_URL,
        cache::{
            BALANCE_TTL_SECS, DEFAULT_STALE_GRACE_SECS, PRICE_TTL_SECS, TOKEN_LIST_TTL_SECS,
        },
        price_service::DEFAULT_COINGECKO_URL,
        retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS},
        token_metadata::DEFAULT_TOKEN_LIST_URL,
    },
};

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:8081,http://localhost:19006";
const DEFAULT_PORT: u16 = 7777;
const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60;
/// Thirty days.
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;
const MAX_RETRY_BASE_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub alchemy_api_key: String,
    pub ethereum_rpc_url: String,
    pub solana_rpc_url: String,
    pub blockcypher_token: String,
    pub blockcypher_base_url: String,
    pub coingecko_url: String,
    pub token_list_url: String,
    pub balance_ttl: Duration,
    pub price_ttl: Duration,
    pub token_list_ttl: Duration,
    pub stale_grace: Duration,
    pub cache_prune_interval: Duration,
    pub retry: RetryPolicy,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Reads the process environment. Missing upstream credentials are fatal.
    pub fn from_env() -> Result<Self, CustomError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CustomError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| {
                CustomError::ConfigError(format!("Missing required environment variable {}", key))
            })
        };

        let alchemy_api_key = required("ALCHEMY_API_KEY")?;
        let solana_rpc_url = required("ALCHEMY_SOLANA_RPC")?;
        let blockcypher_token = required("BLOCKCYPHER_API_TOKEN")?;

        let ethereum_rpc_url = var("ETHEREUM_RPC_URL").unwrap_or_else(|| {
            format!("https://eth-mainnet.g.alchemy.com/v2/{}", alchemy_api_key)
        });

        let max_attempts = number(&var, "RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(CustomError::ConfigError(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        let base_delay_ms = number(&var, "RETRY_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS)?;
        if base_delay_ms > MAX_RETRY_BASE_DELAY_MS {
            return Err(CustomError::ConfigError(format!(
                "RETRY_BASE_DELAY_MS must be at most {}",
                MAX_RETRY_BASE_DELAY_MS
            )));
        }

        let cache_prune_interval = seconds(
            &var,
            "CACHE_PRUNE_INTERVAL_SECS",
            DEFAULT_PRUNE_INTERVAL_SECS,
        )?;
        if cache_prune_interval.is_zero() {
            return Err(CustomError::ConfigError(
                "CACHE_PRUNE_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: number(&var, "PORT", DEFAULT_PORT)?,
            alchemy_api_key,
            ethereum_rpc_url,
            solana_rpc_url,
            blockcypher_token,
            blockcypher_base_url: var("BLOCKCYPHER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BLOCKCYPHER_URL.to_string()),
            coingecko_url: var("COINGECKO_API_URL")
                .unwrap_or_else(|| DEFAULT_COINGECKO_URL.to_string()),
            token_list_url: var("SOLANA_TOKEN_LIST_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_LIST_URL.to_string()),
            balance_ttl: seconds(&var, "BALANCE_CACHE_TTL_SECS", BALANCE_TTL_SECS)?,
            price_ttl: seconds(&var, "PRICE_CACHE_TTL_SECS", PRICE_TTL_SECS)?,
            token_list_ttl: seconds(&var, "TOKEN_LIST_CACHE_TTL_SECS", TOKEN_LIST_TTL_SECS)?,
            stale_grace: seconds(&var, "STALE_GRACE_SECS", DEFAULT_STALE_GRACE_SECS)?,
            cache_prune_interval,
            retry: RetryPolicy::new(max_attempts, base_delay_ms),
            cors_origins: var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// Values that must never appear in logs or error payloads.
    pub fn secrets(&self) -> Vec<&str> {
        vec![
            self.alchemy_api_key.as_str(),
            self.solana_rpc_url.as_str(),
            self.blockcypher_token.as_str(),
        ]
    }
}

fn number<T, V>(var: &V, key: &str, default: T) -> Result<T, CustomError>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CustomError::ConfigError(format!("Failed to parse {}: {:?}", key, raw))
        }),
    }
}

/// Durations in whole seconds, capped so every expiry stays representable.
fn seconds<V>(var: &V, key: &str, default: u64) -> Result<Duration, CustomError>
where
    V: Fn(&str) -> Option<String>,
{
    let secs = number(var, key, default)?;
    if secs > MAX_DURATION_SECS {
        return Err(CustomError::ConfigError(format!(
            "{} must be at most {} seconds",
            key, MAX_DURATION_SECS
        )));
    }
    Ok(Duration::from_secs(secs))
}
