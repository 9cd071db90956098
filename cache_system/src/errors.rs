//! Error types for cache operations
//!
//! Connection acquisition failures are split so callers can tell a deadline
//! from a refused or broken connection.

use context::ContextError;
use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("invalid redis connection settings: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("timed out acquiring a redis connection: {0}")]
    AcquireTimeout(#[source] ContextError),

    #[error("failed to acquire a redis connection: {0}")]
    ConnectionAcquireFailed(#[source] redis::RedisError),

    #[error("redis connection pool is closed")]
    PoolClosed,

    #[error("redis {command} interrupted: {source}")]
    Interrupted {
        command: &'static str,
        source: ContextError,
    },

    #[error("redis {command} failed: {source}")]
    CacheTransportFailed {
        command: &'static str,
        source: redis::RedisError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// The connection could not be obtained before the deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::AcquireTimeout(_))
    }
}
