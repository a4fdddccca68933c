//! Error types for the proxy-refill-pool crate.

use thiserror::Error;

/// Error returned when no live proxy with enough remaining lifetime is available.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("No proxy available in pool")]
pub struct NoProxyAvailable;

/// A queue entry that could not be decoded into a [`crate::Proxy`].
#[derive(Debug, Error)]
#[error("malformed proxy record: {0}")]
pub struct ParseError(#[from] serde_json::Error);

/// Failure of a single call to the upstream listing source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The source answered but did not report success. Carries the raw body.
    #[error("upstream reported failure: {body}")]
    Rejected { body: String },
    #[error("upstream response is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
}

/// Failure talking to the backing queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Configuration could not be read or is not usable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal conditions detected while the pool starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("proxy store unreachable: {0}")]
    Store(#[from] StoreError),
    #[error("upstream self-test failed: {0}")]
    Integration(#[from] FetchError),
}
