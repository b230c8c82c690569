//! Error types

use alloy_primitives::Address;
use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Pool base reserve is zero")]
    ZeroReserve,

    #[error("Price does not fit a decimal: {0}")]
    PriceOverflow(String),

    #[error("Pool token0 {token0} matches neither base {base} nor quote {quote}")]
    PoolTokenMismatch {
        token0: Address,
        base: Address,
        quote: Address,
    },
}

/// Price feed errors
#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Feed disconnected")]
    Disconnected,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("No inbound frame for {0:?}")]
    KeepaliveExpired(std::time::Duration),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type PriceFeedResult<T> = Result<T, PriceFeedError>;
