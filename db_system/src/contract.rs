//! Database capability traits
//!
//! Callers and the transaction manager depend on these traits, never on a
//! concrete driver. Every data-access method follows one routing rule: when
//! the context carries an active transaction the statement runs inside it,
//! otherwise it runs on a connection from the shared pool.

use std::sync::Arc;

use async_trait::async_trait;
use context::Context;
use sqlx::FromRow;

use crate::errors::DbError;
use crate::query::{Args, Query};
use crate::transaction::{TxHandle, TxOptions};

/// Result row of the PostgreSQL driver
pub type Row = sqlx::postgres::PgRow;

/// Outcome of a statement that returns no rows
pub type ExecSummary = sqlx::postgres::PgQueryResult;

/// Plain statement execution
#[async_trait]
pub trait QueryExecer: Send + Sync {
    /// Run a statement that returns no rows
    async fn exec(&self, ctx: &Context, query: &Query, args: Args) -> Result<ExecSummary, DbError>;

    /// Run a query and collect every returned row
    async fn query(&self, ctx: &Context, query: &Query, args: Args) -> Result<Vec<Row>, DbError>;

    /// Run a query and return its first row, [`DbError::NotFound`] if there is none
    async fn query_row(&self, ctx: &Context, query: &Query, args: Args) -> Result<Row, DbError>;
}

/// Queries decoded into caller-provided row types
#[async_trait]
pub trait NamedExecer {
    /// Exactly one row decoded into `T`.
    ///
    /// Zero rows is [`DbError::NotFound`], more than one is
    /// [`DbError::TooManyRows`], a shape mismatch is [`DbError::ScanDecodeFailed`].
    async fn scan_one<T>(&self, ctx: &Context, query: &Query, args: Args) -> Result<T, DbError>
    where
        T: for<'r> FromRow<'r, Row> + Send + Unpin;

    /// Every row decoded into `T`; an empty result is an empty vector
    async fn scan_all<T>(&self, ctx: &Context, query: &Query, args: Args) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, Row> + Send + Unpin;
}

#[async_trait]
impl<E> NamedExecer for E
where
    E: QueryExecer + ?Sized,
{
    async fn scan_one<T>(&self, ctx: &Context, query: &Query, args: Args) -> Result<T, DbError>
    where
        T: for<'r> FromRow<'r, Row> + Send + Unpin,
    {
        let rows = self.query(ctx, query, args).await?;
        let row = exactly_one(rows, query)?;
        T::from_row(&row).map_err(|source| DbError::ScanDecodeFailed {
            query: query.name().to_string(),
            source,
        })
    }

    async fn scan_all<T>(&self, ctx: &Context, query: &Query, args: Args) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, Row> + Send + Unpin,
    {
        let rows = self.query(ctx, query, args).await?;
        rows.iter()
            .map(|row| {
                T::from_row(row).map_err(|source| DbError::ScanDecodeFailed {
                    query: query.name().to_string(),
                    source,
                })
            })
            .collect()
    }
}

/// Starts transactions. Only the transaction manager should call this.
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> Result<TxHandle, DbError>;
}

/// Liveness check without side effects
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, ctx: &Context) -> Result<(), DbError>;
}

/// Full database capability set
#[async_trait]
pub trait Db: QueryExecer + Transactor + Pinger {
    /// Release the pool. Safe to call more than once.
    async fn close(&self);
}

/// Owner of a database handle
#[async_trait]
pub trait DbClient: Send + Sync {
    fn db(&self) -> Arc<dyn Db>;

    async fn close(&self);
}

/// The single row of `rows`, as required by `scan_one`
pub(crate) fn exactly_one<R>(rows: Vec<R>, query: &Query) -> Result<R, DbError> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (None, _) => Err(DbError::NotFound {
            query: query.name().to_string(),
        }),
        (Some(row), 1) => Ok(row),
        (Some(_), count) => Err(DbError::TooManyRows {
            query: query.name().to_string(),
            count,
        }),
    }
}
