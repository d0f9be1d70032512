//! USD valuation of normalized balances through the CoinGecko simple-price API.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use crate::{
    errors::CustomError,
    models::{balance::NormalizedBalance, chain::Chain, price::PriceQuote},
};

use super::{cache::ResponseCache, retry::RetryPolicy};

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

/// Market-data coin id for a ticker, if we track it.
pub fn coin_id(symbol: &str) -> Option<&'static str> {
    let id = match symbol.to_ascii_uppercase().as_str() {
        "ETH" => "ethereum",
        "WETH" => "weth",
        "BTC" => "bitcoin",
        "WBTC" => "wrapped-bitcoin",
        "SOL" => "solana",
        "USDC" => "usd-coin",
        "USDT" => "tether",
        "DAI" => "dai",
        "LINK" => "chainlink",
        "UNI" => "uniswap",
        "AAVE" => "aave",
        "SHIB" => "shiba-inu",
        "PEPE" => "pepe",
        "BONK" => "bonk",
        "JUP" => "jupiter-exchange-solana",
        "RAY" => "raydium",
        "PYTH" => "pyth-network",
        "WIF" => "dogwifcoin",
        _ => return None,
    };
    Some(id)
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Quotes keyed by coin id. Ids the provider does not know are omitted.
    async fn simple_prices(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PriceQuote>, CustomError>;
}

pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MarketData for CoinGeckoClient {
    async fn simple_prices(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PriceQuote>, CustomError> {
        let url = format!("{}/simple/price", self.base_url.trim_end_matches('/'));
        let quotes: HashMap<String, PriceQuote> = self
            .client
            .get(url)
            .query(&[
                ("ids", ids.join(",").as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(quotes)
    }
}

#[derive(Clone)]
pub struct PriceService {
    market: Arc<dyn MarketData>,
    cache: ResponseCache,
    retry: RetryPolicy,
    ttl: Duration,
}

impl PriceService {
    pub fn new(
        market: Arc<dyn MarketData>,
        cache: ResponseCache,
        retry: RetryPolicy,
        ttl: Duration,
    ) -> Self {
        Self {
            market,
            cache,
            retry,
            ttl,
        }
    }

    /// Quotes for the given coin ids, served from cache where fresh. A failed
    /// lookup yields whatever was cached.
    pub async fn quotes(&self, ids: &BTreeSet<String>) -> HashMap<String, PriceQuote> {
        let mut quotes = HashMap::new();
        let mut missing = Vec::new();

        for id in ids {
            match self.cache.get::<PriceQuote>(&price_key(id)) {
                Some(quote) => {
                    quotes.insert(id.clone(), quote);
                }
                None => missing.push(id.clone()),
            }
        }

        if missing.is_empty() {
            return quotes;
        }

        match self
            .retry
            .run("coingecko_simple_price", || self.market.simple_prices(&missing))
            .await
        {
            Ok(fetched) => {
                for (id, quote) in fetched {
                    self.cache.set(&price_key(&id), &quote, self.ttl);
                    quotes.insert(id, quote);
                }
            }
            Err(e) => warn!("Price lookup failed for {:?}: {}", missing, e),
        }

        quotes
    }

    /// Attaches price, 24h change and USD value where a quote is available.
    pub async fn enrich(&self, chain: Chain, mut balance: NormalizedBalance) -> NormalizedBalance {
        let ids: BTreeSet<String> = std::iter::once(chain.ticker())
            .chain(balance.tokens.iter().filter_map(|t| t.symbol.as_deref()))
            .filter_map(coin_id)
            .map(str::to_string)
            .collect();

        let quotes = self.quotes(&ids).await;
        debug!("Pricing {} balance with {} quotes", chain, quotes.len());

        if let Some(quote) = coin_id(chain.ticker()).and_then(|id| quotes.get(id)) {
            balance.native_usd_value = usd_value(balance.native_amount(), quote.usd);
        }

        for token in balance.tokens.iter_mut() {
            let quote = token
                .symbol
                .as_deref()
                .and_then(coin_id)
                .and_then(|id| quotes.get(id));
            if let Some(quote) = quote {
                token.price = Some(quote.usd);
                token.change = quote.usd_24h_change;
                token.usd_value = usd_value(&token.balance, quote.usd);
            }
        }

        balance
    }
}

fn price_key(id: &str) -> String {
    format!("price:{}", id)
}

fn usd_value(amount: &str, price: f64) -> Option<f64> {
    amount.parse::<f64>().ok().map(|a| a * price)
}
