use std::fmt;
use std::str::FromStr;

use crate::errors::CustomError;

/// The fixed set of chains the service can aggregate balances for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Ethereum,
    Bitcoin,
    Solana,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bitcoin => "bitcoin",
            Chain::Solana => "solana",
        }
    }

    /// Ticker of the chain's base currency.
    pub fn ticker(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Bitcoin => "BTC",
            Chain::Solana => "SOL",
        }
    }

    /// Decimal places of the smallest native unit (wei, satoshi, lamport).
    pub fn native_decimals(&self) -> u32 {
        match self {
            Chain::Ethereum => 18,
            Chain::Bitcoin => 8,
            Chain::Solana => 9,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = CustomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethereum" => Ok(Chain::Ethereum),
            "bitcoin" => Ok(Chain::Bitcoin),
            "solana" => Ok(Chain::Solana),
            other => Err(CustomError::UnsupportedChainError(other.to_string())),
        }
    }
}
