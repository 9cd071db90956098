//! Cache system for Redis-based caching
//!
//! [`CacheClient`] is the contract callers depend on. [`RedisClient`]
//! implements it over a bounded, deadline-aware [`ConnectionPool`].

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod client;
pub mod commands;
pub mod errors;
pub mod pool;
pub mod prelude;
pub mod redis_client;

// Re-export centralized config
pub use config::CacheConfig;

pub use client::{CacheClient, CacheClientExt};
pub use errors::CacheError;
pub use pool::{ConnectionPool, PooledConnection};
pub use redis_client::RedisClient;
