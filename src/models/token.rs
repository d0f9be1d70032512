use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub logo: Option<String>,
}

impl TokenMetadata {
    /// Used when a Solana mint is missing from the reference list.
    pub fn unknown() -> Self {
        Self {
            symbol: "Unknown".to_string(),
            name: "Unknown Token".to_string(),
            decimals: 9,
            logo: None,
        }
    }
}

/// What an ERC20 contract reported about itself. Only `decimals` is needed
/// to format a balance; `symbol` and `name` are optional on the standard and
/// some contracts return them in a non-string encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Metadata {
    pub decimals: u32,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

/// One entry of the public Solana token list document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListEntry {
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    #[serde(default, rename = "logoURI")]
    pub logo_uri: Option<String>,
}

impl From<&TokenListEntry> for TokenMetadata {
    fn from(entry: &TokenListEntry) -> Self {
        Self {
            symbol: entry.symbol.clone(),
            name: entry.name.clone(),
            decimals: entry.decimals,
            logo: entry.logo_uri.clone(),
        }
    }
}

/// Solana mainnet-beta id used by the token list.
pub const SOLANA_MAINNET_CHAIN_ID: u64 = 101;

#[derive(Debug, Deserialize)]
pub struct TokenListDocument {
    pub tokens: Vec<TokenListEntry>,
}
