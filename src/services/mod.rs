pub mod balance_service;
pub mod bitcoin;
pub mod cache;
pub mod ethereum;
pub mod price_service;
pub mod retry;
pub mod solana;
pub mod token_metadata;
pub mod units;

#[cfg(test)]
pub(crate) mod mock_upstream;
