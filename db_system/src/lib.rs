//! Database access for PostgreSQL
//!
//! The [`contract`] traits are what callers depend on; [`pg`] implements them
//! on a sqlx pool. [`TxManager`] runs units of work in transactions that
//! travel through the [`Context`](context::Context), so every call made with
//! that context joins the transaction.

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

pub mod contract;
pub mod errors;
pub mod manager;
pub mod pg;
pub mod prelude;
pub mod query;
pub mod transaction;

pub use contract::{Db, DbClient, ExecSummary, NamedExecer, Pinger, QueryExecer, Row, Transactor};
pub use errors::{DbError, TxError};
pub use manager::{Handler, TxManager, TxRunner};
pub use pg::{PgClient, PgDb, PgTransaction};
pub use query::{Args, Query};
pub use transaction::{tx_from, with_tx, AccessMode, IsolationLevel, Transaction, TxHandle, TxOptions};

// Re-export centralized config
pub use config::DatabaseConfig;
