//! Convenience re-exports for common platform-common usage
//!
//! # Example
//!
//! ```rust
//! use platform_common::prelude::*;
//!
//! // Now the platform, its subsystems and their errors are in scope
//! ```

// Core platform components
pub use crate::core::Platform;
pub use crate::errors::PlatformError;

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, CloserConfig, ConfigError, DatabaseConfig};
pub use context::{CancelHandle, Context, ContextError};

// Subsystems
pub use cache_system::{CacheClient, CacheClientExt, CacheError, RedisClient};
pub use db_system::prelude::*;
pub use shutdown_system::prelude::*;

// Common external dependencies
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use sqlx;
pub use tokio;
