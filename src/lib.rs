//! # platform-common
//!
//! Shared infrastructure for services: PostgreSQL access with transactions
//! that travel through the call context, a Redis cache client, and a
//! graceful shutdown coordinator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use platform_common::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let ctx = Context::background();
//!     let platform = Platform::new(&ctx, config).await?;
//!
//!     let db = platform.db();
//!     let insert = Query::new("user.create", "INSERT INTO users (name) VALUES ($1)");
//!     let audit = Query::new("audit.create", "INSERT INTO audit (action) VALUES ($1)");
//!
//!     platform
//!         .tx_manager()
//!         .read_committed(&ctx, move |ctx| async move {
//!             db.exec(&ctx, &insert, args!["John Doe"]).await?;
//!             db.exec(&ctx, &audit, args!["user.create"]).await?;
//!             Ok(())
//!         })
//!         .await?;
//!
//!     platform.cache().set(&ctx, "user:last", "John Doe").await?;
//!
//!     platform.closer().wait().await;
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
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

pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use crate::core::Platform;
pub use crate::errors::PlatformError;

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, CloserConfig, DatabaseConfig};

// Re-export the subsystem crates
pub use cache_system;
pub use context;
pub use db_system;
pub use shutdown_system;

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
