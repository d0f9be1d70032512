use serde::{Deserialize, Serialize};

/// USD quote for one market-data coin id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub usd: f64,
    #[serde(default)]
    pub usd_24h_change: Option<f64>,
}
