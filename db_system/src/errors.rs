//! Error types for database access and transactions

use context::ContextError;
use thiserror::Error;

/// Failures at the database boundary. Each carries the query name or
/// operation it came from; none are retried here.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to connect to db: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("timed out acquiring a database connection: {0}")]
    AcquireTimeout(#[source] ContextError),

    #[error("failed to acquire a database connection: {0}")]
    ConnectionAcquireFailed(#[source] sqlx::Error),

    #[error("query {query} interrupted: {source}")]
    Interrupted { query: String, source: ContextError },

    #[error("query {query} failed: {source}")]
    Query { query: String, source: sqlx::Error },

    #[error("query {query}: no rows in result set")]
    NotFound { query: String },

    #[error("query {query}: expected one row, got {count}")]
    TooManyRows { query: String, count: usize },

    #[error("query {query}: cannot scan row into destination: {source}")]
    ScanDecodeFailed { query: String, source: sqlx::Error },

    #[error("invalid argument for query {query}: {message}")]
    InvalidArgument { query: String, message: String },

    #[error("transaction {operation} failed: {source}")]
    Transaction {
        operation: &'static str,
        source: sqlx::Error,
    },

    #[error("transaction has already been committed or rolled back")]
    TxFinished,

    #[error("context carries a transaction that was not started by this driver")]
    ForeignTransaction,
}

impl DbError {
    /// Deadline or cancellation hit while waiting for a pooled connection
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DbError::AcquireTimeout(_) | DbError::ConnectionAcquireFailed(sqlx::Error::PoolTimedOut)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }
}

/// Terminal outcome of one transaction attempt. The manager never retries.
#[derive(Error, Debug)]
pub enum TxError {
    #[error("begin transaction failed: {0}")]
    BeginFailed(#[source] DbError),

    #[error("failed executing code inside transaction: {0}")]
    WorkFailed(#[source] anyhow::Error),

    #[error("failed executing code inside transaction: {cause}; rollback error: {rollback}")]
    RollbackFailed {
        #[source]
        cause: anyhow::Error,
        rollback: DbError,
    },

    #[error("transaction commit failed: {0}")]
    CommitFailed(#[source] DbError),
}

impl TxError {
    /// The error returned (or panic raised) by the unit of work, if that is what failed
    pub fn work_error(&self) -> Option<&anyhow::Error> {
        match self {
            TxError::WorkFailed(cause) | TxError::RollbackFailed { cause, .. } => Some(cause),
            TxError::BeginFailed(_) | TxError::CommitFailed(_) => None,
        }
    }
}
