use serde::{Deserialize, Serialize};

use super::chain::Chain;
use crate::errors::CustomError;

/// Body accepted by the balance endpoints. Fields are optional so that a
/// missing value is reported as a validation error instead of a JSON error.
#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    pub blockchain: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceQuery {
    pub chain: Chain,
    pub address: String,
}

impl BalanceQuery {
    pub fn new(chain: Chain, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }

    /// Checks presence of both fields and that the chain is supported.
    /// Chain-specific address checks happen in the adapters.
    pub fn from_request(req: &BalanceRequest) -> Result<Self, CustomError> {
        let (blockchain, address) = match (req.blockchain.as_deref(), req.address.as_deref()) {
            (Some(b), Some(a)) if !b.trim().is_empty() && !a.trim().is_empty() => (b, a),
            _ => {
                return Err(CustomError::ValidationError(
                    "Blockchain and address are required".to_string(),
                ))
            }
        };

        Ok(Self::new(blockchain.parse()?, address.trim()))
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.chain, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBalance {
    /// `"<amount> <TICKER>"`, e.g. `"1.25 ETH"`.
    pub native_balance: String,
    pub tokens: Vec<TokenBalance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_usd_value: Option<f64>,
}

impl NormalizedBalance {
    pub fn new(chain: Chain, native_amount: &str, tokens: Vec<TokenBalance>) -> Self {
        Self {
            native_balance: format!("{} {}", native_amount, chain.ticker()),
            tokens,
            native_usd_value: None,
        }
    }

    /// Decimal part of `native_balance` without the ticker.
    pub fn native_amount(&self) -> &str {
        self.native_balance
            .split_whitespace()
            .next()
            .unwrap_or("0")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl TokenBalance {
    pub fn new(token_address: impl Into<String>, balance: impl Into<String>) -> Self {
        Self {
            token_address: token_address.into(),
            name: None,
            symbol: None,
            balance: balance.into(),
            usd_value: None,
            price: None,
            change: None,
            logo: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(blockchain: Option<&str>, address: Option<&str>) -> BalanceRequest {
        BalanceRequest {
            blockchain: blockchain.map(str::to_string),
            address: address.map(str::to_string),
        }
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        for req in [
            request(None, Some("abc")),
            request(Some("solana"), None),
            request(Some("solana"), Some("  ")),
        ] {
            assert!(matches!(
                BalanceQuery::from_request(&req),
                Err(CustomError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn unsupported_chain_is_rejected() {
        let err = BalanceQuery::from_request(&request(Some("litecoin"), Some("abc"))).unwrap_err();
        assert_eq!(err, CustomError::UnsupportedChainError("litecoin".to_string()));
    }

    #[test]
    fn cache_key_joins_chain_and_address() {
        let query = BalanceQuery::from_request(&request(Some("bitcoin"), Some("bc1qxyz"))).unwrap();
        assert_eq!(query.cache_key(), "bitcoin:bc1qxyz");
    }

    #[test]
    fn serializes_with_camel_case_and_skips_absent_fields() {
        let balance = NormalizedBalance::new(
            Chain::Solana,
            "1",
            vec![TokenBalance::new("mint", "5")],
        );
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["nativeBalance"], "1 SOL");
        assert_eq!(json["tokens"][0]["tokenAddress"], "mint");
        assert!(json["tokens"][0].get("usdValue").is_none());
        assert!(json.get("nativeUsdValue").is_none());
        assert_eq!(balance.native_amount(), "1");
    }
}
