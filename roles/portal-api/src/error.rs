use portal_redis::RedisError;
use thiserror::Error;

/// Problems with the address carried in a request's query string.
///
/// The `Display` text is what API callers see in `{"result":"error","message":...}`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    #[error("URL parameters not found")]
    MissingQueryString,

    #[error("Invalid URL parameters")]
    MissingAddress,

    #[error("Invalid wallet address")]
    InvalidAddress,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Invalid amount {value:?} stored under {key}")]
    InvalidAmount { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Failed to fetch snapshot: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Failed to serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}
