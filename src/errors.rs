//! Error types for the platform-common crate
//!
//! Each subsystem keeps its own error enum; [`PlatformError`] wraps them for
//! code that works with the assembled [`Platform`](crate::Platform).

use cache_system::CacheError;
use config::ConfigError;
use db_system::{DbError, TxError};
use shutdown_system::CloserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("shutdown error: {0}")]
    Closer(#[from] CloserError),
}
