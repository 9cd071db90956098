//! Convenience re-exports for common cache-system usage

// Core cache system components
pub use crate::client::{CacheClient, CacheClientExt};
pub use crate::errors::CacheError;
pub use crate::redis_client::RedisClient;

// Re-export centralized config
pub use config::CacheConfig;
pub use context::Context;

// Common external dependencies
pub use async_trait::async_trait;
pub use redis;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
