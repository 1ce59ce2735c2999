//! Error types for the wallet session manager

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("User cancelled wallet selection")]
    UserCancelled,

    #[error("Transport '{provider}' failed to initialize: {reason}")]
    TransportInit { provider: String, reason: String },

    #[error("Unknown wallet provider: {0}")]
    UnknownProvider(String),

    #[error("Wallet reported no authorized accounts")]
    NoAccount,

    #[error("Network query failed: {0}")]
    NetworkQuery(String),

    #[error("Transport teardown failed: {0}")]
    TransportTeardown(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transport does not support {0}")]
    Unsupported(&'static str),

    #[error("Provider cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The user backed out of a prompt. Not worth an error banner.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Error::UserCancelled)
    }

    /// Whether retrying the same operation may succeed without changing config.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransportInit { .. } | Error::NetworkQuery(_) | Error::Rpc(_) | Error::NoAccount
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
