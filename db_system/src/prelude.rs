//! Convenience re-exports for common db-system usage

// Contracts and the transaction manager
pub use crate::contract::{Db, DbClient, ExecSummary, NamedExecer, Pinger, QueryExecer, Row, Transactor};
pub use crate::errors::{DbError, TxError};
pub use crate::manager::{Handler, TxManager, TxRunner};
pub use crate::query::{Args, Query};
pub use crate::transaction::{IsolationLevel, TxOptions};
pub use crate::args;

// PostgreSQL driver
pub use crate::pg::{PgClient, PgDb};

// Re-export centralized config
pub use config::DatabaseConfig;
pub use context::{Context, ContextError};

// Common external dependencies
pub use anyhow;
pub use async_trait::async_trait;
pub use sqlx::FromRow;
