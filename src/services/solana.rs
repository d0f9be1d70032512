use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::{
    errors::CustomError,
    models::{
        balance::{NormalizedBalance, TokenBalance},
        chain::Chain,
    },
};

use super::{retry::RetryPolicy, token_metadata::TokenMetadataResolver, units::format_units};

pub const SPL_TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const TOKEN_PROGRAMS: [&str; 2] = [SPL_TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID];

/// Mint and raw amount held by one token account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: String,
    pub amount: u64,
}

#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Native balance in lamports.
    async fn get_balance(&self, owner: &str) -> Result<u64, CustomError>;
    /// Public keys of the token accounts `owner` holds under `program_id`.
    async fn token_accounts_by_owner(
        &self,
        owner: &str,
        program_id: &str,
    ) -> Result<Vec<String>, CustomError>;
    async fn token_account(&self, account: &str) -> Result<TokenAccount, CustomError>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    mint: String,
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
}

/// Plain JSON-RPC client for a Solana endpoint, `confirmed` commitment.
pub struct SolanaRpcClient {
    client: reqwest::Client,
    url: String,
}

impl SolanaRpcClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, CustomError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let envelope: RpcEnvelope<R> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CustomError::from(e).redacted(&[self.url.as_str()]))?
            .json()
            .await?;

        match envelope {
            RpcEnvelope { error: Some(err), .. } => {
                Err(CustomError::from_rpc_error(err.code, &err.message)
                    .context(method)
                    .redacted(&[self.url.as_str()]))
            }
            RpcEnvelope { result: Some(result), .. } => Ok(result),
            RpcEnvelope { result: None, .. } => {
                Err(CustomError::upstream(format!("{} returned no result", method)))
            }
        }
    }
}

#[async_trait]
impl SolanaRpc for SolanaRpcClient {
    async fn get_balance(&self, owner: &str) -> Result<u64, CustomError> {
        let response: WithContext<u64> = self
            .call("getBalance", json!([owner, { "commitment": "confirmed" }]))
            .await?;
        Ok(response.value)
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &str,
        program_id: &str,
    ) -> Result<Vec<String>, CustomError> {
        let response: WithContext<Vec<KeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "programId": program_id },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;
        Ok(response.value.into_iter().map(|a| a.pubkey).collect())
    }

    async fn token_account(&self, account: &str) -> Result<TokenAccount, CustomError> {
        let response: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([account, { "encoding": "jsonParsed", "commitment": "confirmed" }]),
            )
            .await?;

        let info = response
            .value
            .ok_or_else(|| CustomError::upstream(format!("Token account {} not found", account)))?
            .data
            .parsed
            .info;
        let amount = info
            .token_amount
            .amount
            .parse::<u64>()
            .map_err(|e| CustomError::upstream(format!("Invalid amount for {}: {}", account, e)))?;

        Ok(TokenAccount {
            mint: info.mint,
            amount,
        })
    }
}

/// A valid public key is base58 that decodes to exactly 32 bytes.
pub fn validate_pubkey(address: &str) -> Result<(), CustomError> {
    match bs58::decode(address).into_vec() {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => Err(CustomError::InvalidAddressError(format!(
            "Invalid Solana address: {}",
            address
        ))),
    }
}

pub struct SolanaAdapter {
    rpc: Arc<dyn SolanaRpc>,
    resolver: TokenMetadataResolver,
    retry: RetryPolicy,
}

impl SolanaAdapter {
    pub fn new(
        rpc: Arc<dyn SolanaRpc>,
        resolver: TokenMetadataResolver,
        retry: RetryPolicy,
    ) -> Self {
        Self { rpc, resolver, retry }
    }

    pub async fn fetch_balance(&self, address: &str) -> Result<NormalizedBalance, CustomError> {
        validate_pubkey(address)?;

        let lamports = self
            .retry
            .run("getBalance", || self.rpc.get_balance(address))
            .await?;

        let mut account_keys = Vec::new();
        for program_id in TOKEN_PROGRAMS {
            account_keys.extend(self.accounts_for_program(address, program_id).await);
        }

        let details = account_keys.iter().map(|key| self.account_detail(key));
        let accounts: Vec<TokenAccount> = join_all(details)
            .await
            .into_iter()
            .flatten()
            .collect();

        let mints: Vec<String> = accounts.iter().map(|a| a.mint.clone()).collect();
        let metadata = self.resolver.resolve_all(&mints).await;

        let tokens = accounts
            .into_iter()
            .zip(metadata)
            .map(|(account, meta)| {
                let amount = format_units(account.amount, meta.decimals);
                let mut token = TokenBalance::new(account.mint, amount);
                token.name = Some(meta.name);
                token.symbol = Some(meta.symbol);
                token.logo = meta.logo;
                token
            })
            .collect();

        Ok(NormalizedBalance::new(
            Chain::Solana,
            &format_units(lamports, Chain::Solana.native_decimals()),
            tokens,
        ))
    }

    /// A failing program contributes no accounts.
    async fn accounts_for_program(&self, owner: &str, program_id: &str) -> Vec<String> {
        match self
            .retry
            .run("getTokenAccountsByOwner", || self.rpc.token_accounts_by_owner(owner, program_id))
            .await
        {
            Ok(keys) => {
                debug!("{} token accounts under program {}", keys.len(), program_id);
                keys
            }
            Err(e) => {
                warn!("Failed to fetch token accounts for program {}: {}", program_id, e);
                Vec::new()
            }
        }
    }

    async fn account_detail(&self, account: &str) -> Option<TokenAccount> {
        match self
            .retry
            .run("getAccountInfo", || self.rpc.token_account(account))
            .await
        {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!("Dropping token account {}: {}", account, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::token_metadata::tests::{resolver, MockTokenList, USDC_MINT};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub const OWNER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const UNLISTED_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    #[derive(Default)]
    pub struct MockSolanaRpc {
        pub lamports: u64,
        pub accounts: HashMap<&'static str, Vec<String>>,
        pub details: HashMap<String, TokenAccount>,
        pub failing_programs: Vec<&'static str>,
        pub calls: AtomicUsize,
    }

    impl MockSolanaRpc {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn with_account(
            mut self,
            program: &'static str,
            key: &str,
            mint: &str,
            amount: u64,
        ) -> Self {
            self.accounts.entry(program).or_default().push(key.to_string());
            self.details.insert(
                key.to_string(),
                TokenAccount {
                    mint: mint.to_string(),
                    amount,
                },
            );
            self
        }
    }

    #[async_trait]
    impl SolanaRpc for MockSolanaRpc {
        async fn get_balance(&self, _owner: &str) -> Result<u64, CustomError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lamports)
        }

        async fn token_accounts_by_owner(
            &self,
            _owner: &str,
            program_id: &str,
        ) -> Result<Vec<String>, CustomError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_programs.iter().any(|p| *p == program_id) {
                return Err(CustomError::upstream("Invalid param: could not find program"));
            }
            Ok(self.accounts.get(program_id).cloned().unwrap_or_default())
        }

        async fn token_account(&self, account: &str) -> Result<TokenAccount, CustomError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.details
                .get(account)
                .cloned()
                .ok_or_else(|| CustomError::upstream("account not found"))
        }
    }

    fn adapter(rpc: Arc<MockSolanaRpc>) -> SolanaAdapter {
        let tokens = resolver(Arc::new(MockTokenList::with_usdc()));
        SolanaAdapter::new(rpc, tokens, RetryPolicy::default())
    }

    #[test]
    fn validates_public_keys() {
        assert!(validate_pubkey(OWNER).is_ok());
        assert!(validate_pubkey(USDC_MINT).is_ok());
        assert!(validate_pubkey("0x742d35Cc6634C0532925a3b844Bc454e4438f44e").is_err());
        assert!(validate_pubkey("abc").is_err());
        assert!(validate_pubkey("").is_err());
    }

    #[tokio::test]
    async fn invalid_address_fails_before_any_call() {
        let rpc = Arc::new(MockSolanaRpc::default());
        let err = adapter(rpc.clone()).fetch_balance("not-base58-0OIl").await.unwrap_err();

        assert!(matches!(err, CustomError::InvalidAddressError(_)));
        assert_eq!(rpc.calls(), 0);
    }

    #[tokio::test]
    async fn zero_holdings() {
        let rpc = Arc::new(MockSolanaRpc::default());
        let balance = adapter(rpc).fetch_balance(OWNER).await.unwrap();

        assert_eq!(balance.native_balance, "0 SOL");
        assert!(balance.tokens.is_empty());
    }

    #[tokio::test]
    async fn one_sol_and_five_usdc() {
        let rpc = Arc::new(
            MockSolanaRpc {
                lamports: 1_000_000_000,
                ..Default::default()
            }
            .with_account(SPL_TOKEN_PROGRAM_ID, "acct-usdc", USDC_MINT, 5_000_000),
        );
        let balance = adapter(rpc).fetch_balance(OWNER).await.unwrap();

        assert_eq!(balance.native_balance, "1 SOL");
        assert_eq!(balance.tokens.len(), 1);
        let usdc = &balance.tokens[0];
        assert_eq!(usdc.token_address, USDC_MINT);
        assert_eq!(usdc.balance, "5");
        assert_eq!(usdc.symbol.as_deref(), Some("USDC"));
        assert_eq!(usdc.name.as_deref(), Some("USD Coin"));
        assert!(usdc.logo.is_some());
    }

    #[tokio::test]
    async fn unlisted_mint_uses_nine_decimals() {
        let rpc = Arc::new(MockSolanaRpc::default().with_account(
            TOKEN_2022_PROGRAM_ID,
            "acct-x",
            UNLISTED_MINT,
            123_456_789,
        ));
        let balance = adapter(rpc).fetch_balance(OWNER).await.unwrap();

        let token = &balance.tokens[0];
        assert_eq!(token.symbol.as_deref(), Some("Unknown"));
        assert_eq!(token.name.as_deref(), Some("Unknown Token"));
        assert_eq!(token.balance, "0.123456789");
    }

    #[tokio::test]
    async fn failing_program_contributes_nothing() {
        let mut rpc = MockSolanaRpc::default()
            .with_account(SPL_TOKEN_PROGRAM_ID, "acct-usdc", USDC_MINT, 5_000_000)
            .with_account(TOKEN_2022_PROGRAM_ID, "acct-x", UNLISTED_MINT, 1);
        rpc.failing_programs.push(TOKEN_2022_PROGRAM_ID);

        let balance = adapter(Arc::new(rpc)).fetch_balance(OWNER).await.unwrap();
        assert_eq!(balance.tokens.len(), 1);
        assert_eq!(balance.tokens[0].token_address, USDC_MINT);
    }

    #[tokio::test]
    async fn failing_account_detail_is_dropped() {
        let mut rpc = MockSolanaRpc::default()
            .with_account(SPL_TOKEN_PROGRAM_ID, "acct-usdc", USDC_MINT, 5_000_000)
            .with_account(SPL_TOKEN_PROGRAM_ID, "acct-gone", UNLISTED_MINT, 1);
        rpc.details.remove("acct-gone");

        let balance = adapter(Arc::new(rpc)).fetch_balance(OWNER).await.unwrap();
        assert_eq!(balance.tokens.len(), 1);
        assert_eq!(balance.tokens[0].balance, "5");
    }

    #[tokio::test]
    async fn tokens_keep_discovery_order_across_programs() {
        let rpc = MockSolanaRpc::default()
            .with_account(TOKEN_2022_PROGRAM_ID, "acct-x", UNLISTED_MINT, 1)
            .with_account(SPL_TOKEN_PROGRAM_ID, "acct-usdc", USDC_MINT, 5_000_000);

        let balance = adapter(Arc::new(rpc)).fetch_balance(OWNER).await.unwrap();
        let order: Vec<&str> = balance.tokens.iter().map(|t| t.token_address.as_str()).collect();
        assert_eq!(order, vec![USDC_MINT, UNLISTED_MINT]);
    }

    mod rpc_client {
        use super::*;
        use crate::services::mock_upstream::{rpc_error, rpc_result, MockUpstream};
        use actix_web::http::StatusCode;
        use serde_json::json;

        const SECRET: &str = "sol-secret";

        fn client(upstream: &MockUpstream) -> SolanaRpcClient {
            SolanaRpcClient::new(reqwest::Client::new(), format!("{}/v2/{}", upstream.url, SECRET))
        }

        #[actix_web::test]
        async fn decodes_balance_accounts_and_parsed_account() {
            let upstream = MockUpstream::start(|req| match req.rpc_method() {
                "getBalance" => {
                    rpc_result(req, json!({"context": {"slot": 1}, "value": 1_000_000_000u64}))
                }
                "getTokenAccountsByOwner" => rpc_result(
                    req,
                    json!({
                        "context": {"slot": 1},
                        "value": [{
                            "pubkey": "acct-usdc",
                            "account": {
                                "lamports": 2039280,
                                "owner": SPL_TOKEN_PROGRAM_ID,
                                "data": {}
                            }
                        }]
                    }),
                ),
                "getAccountInfo" => rpc_result(
                    req,
                    json!({
                        "context": {"slot": 1},
                        "value": {
                            "lamports": 2039280,
                            "owner": SPL_TOKEN_PROGRAM_ID,
                            "executable": false,
                            "data": {
                                "program": "spl-token",
                                "space": 165,
                                "parsed": {
                                    "type": "account",
                                    "info": {
                                        "isNative": false,
                                        "mint": USDC_MINT,
                                        "owner": OWNER,
                                        "state": "initialized",
                                        "tokenAmount": {
                                            "amount": "5000000",
                                            "decimals": 6,
                                            "uiAmount": 5.0,
                                            "uiAmountString": "5"
                                        }
                                    }
                                }
                            }
                        }
                    }),
                ),
                _ => rpc_error(req, StatusCode::OK, -32601, "Method not found"),
            })
            .await;
            let client = client(&upstream);

            assert_eq!(client.get_balance(OWNER).await.unwrap(), 1_000_000_000);
            assert_eq!(
                client.token_accounts_by_owner(OWNER, SPL_TOKEN_PROGRAM_ID).await.unwrap(),
                vec!["acct-usdc".to_string()]
            );
            assert_eq!(
                client.token_account("acct-usdc").await.unwrap(),
                TokenAccount {
                    mint: USDC_MINT.to_string(),
                    amount: 5_000_000,
                }
            );

            let requests = upstream.requests();
            assert_eq!(requests[0].uri, format!("/v2/{}", SECRET));
            assert_eq!(requests[1].body["params"][1]["programId"], SPL_TOKEN_PROGRAM_ID);
            assert_eq!(requests[2].body["params"][1]["encoding"], "jsonParsed");
        }

        #[actix_web::test]
        async fn error_envelopes_are_classified_by_code() {
            let upstream = MockUpstream::start(|req| match req.rpc_method() {
                "getBalance" => rpc_error(req, StatusCode::OK, -32005, "Node is behind"),
                _ => rpc_error(
                    req,
                    StatusCode::OK,
                    -32602,
                    "Invalid param: 429 is not a valid account -32005",
                ),
            })
            .await;
            let client = client(&upstream);

            let err = client.get_balance(OWNER).await.unwrap_err();
            assert!(err.is_rate_limited(), "{:?}", err);

            let err = client.token_account("acct-usdc").await.unwrap_err();
            match err {
                CustomError::UpstreamFailure { details, .. } => {
                    assert!(details.starts_with("getAccountInfo: RPC error -32602"), "{}", details);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        #[actix_web::test]
        async fn missing_result_and_missing_account_are_upstream_failures() {
            let upstream = MockUpstream::start(|req| match req.rpc_method() {
                "getBalance" => (StatusCode::OK, json!({"jsonrpc": "2.0", "id": req.body["id"]})),
                _ => rpc_result(req, json!({"context": {"slot": 1}, "value": null})),
            })
            .await;
            let client = client(&upstream);

            let err = client.get_balance(OWNER).await.unwrap_err();
            assert!(format!("{:?}", err).contains("getBalance returned no result"));

            let err = client.token_account("acct-gone").await.unwrap_err();
            assert!(format!("{:?}", err).contains("acct-gone not found"));
        }

        #[actix_web::test]
        async fn http_errors_never_expose_the_endpoint() {
            let upstream = MockUpstream::start(|req| match req.rpc_method() {
                "getBalance" => (StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"})),
                _ => (StatusCode::BAD_GATEWAY, json!({"error": "upstream"})),
            })
            .await;
            let client = client(&upstream);

            let err = client.get_balance(OWNER).await.unwrap_err();
            assert!(err.is_rate_limited());
            assert!(!format!("{:?}", err).contains(SECRET));

            let err = client.token_account("acct-usdc").await.unwrap_err();
            assert!(matches!(err, CustomError::UpstreamFailure { .. }));
            assert!(!format!("{:?}", err).contains(SECRET));
        }
    }
}
