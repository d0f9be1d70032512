use std::fmt;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use ethers::providers::{ProviderError, RpcError};
use thiserror::Error;

use crate::models::api_response::ErrorBody;

/// Message surfaced to callers when a balance lookup fails upstream.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to fetch balance";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CustomError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Unsupported blockchain: {0}")]
    UnsupportedChainError(String),

    #[error("Invalid address: {0}")]
    InvalidAddressError(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("{message}")]
    UpstreamFailure { message: String, details: String },

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CustomError {
    pub fn upstream(details: impl Into<String>) -> Self {
        CustomError::UpstreamFailure {
            message: UPSTREAM_FAILURE_MESSAGE.to_string(),
            details: details.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CustomError::RateLimited(_))
    }

    /// Input errors are reported before any upstream call and never retried.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            CustomError::ValidationError(_)
                | CustomError::UnsupportedChainError(_)
                | CustomError::InvalidAddressError(_)
        )
    }

    /// Folds anything that is not a caller error into `UpstreamFailure`,
    /// keeping the original text as diagnostics.
    pub fn into_upstream(self) -> Self {
        match self {
            e if e.is_bad_request() => e,
            e @ CustomError::UpstreamFailure { .. } => e,
            other => CustomError::upstream(other.to_string()),
        }
    }

    /// Maps a JSON-RPC error object. Alchemy and Solana RPC nodes throttle
    /// with code 429 or -32005.
    pub fn from_rpc_error(code: i64, message: &str) -> Self {
        let text = format!("RPC error {}: {}", code, message);
        if RATE_LIMIT_RPC_CODES.contains(&code) || mentions_rate_limit(message) {
            CustomError::RateLimited(text)
        } else {
            CustomError::upstream(text)
        }
    }

    /// Classifies a provider message that carries no structured code. Only
    /// the wording is inspected, never digits, since the text may embed
    /// addresses or hashes.
    pub fn classify(text: String) -> Self {
        if mentions_rate_limit(&text) {
            CustomError::RateLimited(text)
        } else {
            CustomError::upstream(text)
        }
    }

    /// Prefixes the diagnostic text without changing the error kind.
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            CustomError::RateLimited(msg) => {
                CustomError::RateLimited(format!("{}: {}", context, msg))
            }
            CustomError::UpstreamFailure { message, details } => CustomError::UpstreamFailure {
                message,
                details: format!("{}: {}", context, details),
            },
            CustomError::MetadataUnavailable(msg) => {
                CustomError::MetadataUnavailable(format!("{}: {}", context, msg))
            }
            other => other,
        }
    }

    /// Strips the given secrets from any diagnostic text carried by the error.
    pub fn redacted(self, secrets: &[&str]) -> Self {
        match self {
            CustomError::RateLimited(msg) => CustomError::RateLimited(redact(&msg, secrets)),
            CustomError::UpstreamFailure { message, details } => CustomError::UpstreamFailure {
                message,
                details: redact(&details, secrets),
            },
            CustomError::MetadataUnavailable(msg) => {
                CustomError::MetadataUnavailable(redact(&msg, secrets))
            }
            other => other,
        }
    }
}

const RATE_LIMIT_RPC_CODES: [i64; 2] = [429, -32005];

fn mentions_rate_limit(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["too many requests", "rate limit", "rate-limit", "compute units per second"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

pub fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "[REDACTED]"))
}

impl From<reqwest::Error> for CustomError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return CustomError::RateLimited(err.without_url().to_string());
        }
        CustomError::upstream(err.without_url().to_string())
    }
}

impl From<ProviderError> for CustomError {
    fn from(err: ProviderError) -> Self {
        if let Some(response) = err.as_error_response() {
            return CustomError::from_rpc_error(response.code, &response.message);
        }
        CustomError::classify(err.to_string())
    }
}

impl From<serde_json::Error> for CustomError {
    fn from(err: serde_json::Error) -> Self {
        CustomError::upstream(format!("Malformed upstream response: {}", err))
    }
}

impl ResponseError for CustomError {
    fn status_code(&self) -> StatusCode {
        if self.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            CustomError::UpstreamFailure { message, details } => ErrorBody {
                error: message.clone(),
                details: Some(details.clone()),
            },
            e if e.is_bad_request() => ErrorBody {
                error: e.to_string(),
                details: None,
            },
            other => ErrorBody {
                error: UPSTREAM_FAILURE_MESSAGE.to_string(),
                details: Some(other.to_string()),
            },
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
