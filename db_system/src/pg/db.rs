//! PostgreSQL implementation of the database contract

use std::sync::Arc;

use async_trait::async_trait;
use context::{Context, ContextError};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, PgPool, Postgres};

use super::transaction::PgTransaction;
use crate::contract::{Db, ExecSummary, Pinger, QueryExecer, Row, Transactor};
use crate::errors::DbError;
use crate::query::{Args, Query};
use crate::transaction::{tx_from, TxHandle, TxOptions};

/// Run `$body` on the connection the context selects: the active
/// transaction's connection if there is one, a pooled connection otherwise.
/// `$conn` is bound to `&mut PgConnection` inside the body.
macro_rules! on_connection {
    ($db:expr, $ctx:expr, $query:expr, |$conn:ident| $body:expr) => {{
        match $db.transaction($ctx)? {
            Some(tx) => {
                let mut guard = tx.lock($ctx).await?;
                let $conn: &mut PgConnection = match guard.as_mut() {
                    Some(open) => &mut **open,
                    None => return Err(DbError::TxFinished),
                };
                settle($query.name(), $ctx.run($body).await)
            }
            None => {
                let mut pooled = $db.acquire($ctx).await?;
                let $conn: &mut PgConnection = &mut *pooled;
                settle($query.name(), $ctx.run($body).await)
            }
        }
    }};
}

/// Map the two failure layers of a statement: the context giving up, or the driver erroring
fn settle<T>(
    query: &str,
    outcome: Result<Result<T, sqlx::Error>, ContextError>,
) -> Result<T, DbError> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(DbError::Query {
            query: query.to_string(),
            source,
        }),
        Err(source) => Err(DbError::Interrupted {
            query: query.to_string(),
            source,
        }),
    }
}

/// Database handle over a sqlx [`PgPool`]
#[derive(Debug, Clone)]
pub struct PgDb {
    pool: PgPool,
}

impl PgDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool, for callers that need sqlx directly
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The PostgreSQL transaction carried by `ctx`, if any
    fn transaction<'c>(&self, ctx: &'c Context) -> Result<Option<&'c PgTransaction>, DbError> {
        match tx_from(ctx) {
            None => Ok(None),
            Some(tx) => tx
                .as_any()
                .downcast_ref::<PgTransaction>()
                .map(Some)
                .ok_or(DbError::ForeignTransaction),
        }
    }

    async fn acquire(&self, ctx: &Context) -> Result<PoolConnection<Postgres>, DbError> {
        match ctx.run(self.pool.acquire()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(err)) => Err(DbError::ConnectionAcquireFailed(err)),
            Err(err) => Err(DbError::AcquireTimeout(err)),
        }
    }
}

#[async_trait]
impl QueryExecer for PgDb {
    async fn exec(&self, ctx: &Context, query: &Query, args: Args) -> Result<ExecSummary, DbError> {
        debug_log!(query = query.name(), sql = query.raw(), "exec");
        let arguments = args.into_arguments(query)?;
        on_connection!(self, ctx, query, |conn| {
            sqlx::query_with(query.raw(), arguments).execute(conn)
        })
    }

    async fn query(&self, ctx: &Context, query: &Query, args: Args) -> Result<Vec<Row>, DbError> {
        debug_log!(query = query.name(), sql = query.raw(), "query");
        let arguments = args.into_arguments(query)?;
        on_connection!(self, ctx, query, |conn| {
            sqlx::query_with(query.raw(), arguments).fetch_all(conn)
        })
    }

    async fn query_row(&self, ctx: &Context, query: &Query, args: Args) -> Result<Row, DbError> {
        debug_log!(query = query.name(), sql = query.raw(), "query row");
        let arguments = args.into_arguments(query)?;
        let row: Option<Row> = on_connection!(self, ctx, query, |conn| {
            sqlx::query_with(query.raw(), arguments).fetch_optional(conn)
        })?;
        row.ok_or_else(|| DbError::NotFound {
            query: query.name().to_string(),
        })
    }
}

#[async_trait]
impl Transactor for PgDb {
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> Result<TxHandle, DbError> {
        let mut tx = match ctx.run(self.pool.begin()).await {
            Ok(Ok(tx)) => tx,
            Ok(Err(source)) => {
                return Err(DbError::Transaction {
                    operation: "begin",
                    source,
                });
            }
            Err(err) => return Err(DbError::AcquireTimeout(err)),
        };

        let statement = opts.to_sql();
        trace_log!(sql = %statement, "applying transaction options");
        match ctx.run(sqlx::query(&statement).execute(&mut *tx)).await {
            Ok(Ok(_)) => Ok(Arc::new(PgTransaction::new(tx))),
            Ok(Err(source)) => Err(DbError::Transaction {
                operation: "begin",
                source,
            }),
            Err(source) => Err(DbError::Interrupted {
                query: "begin".to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl Pinger for PgDb {
    async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        let mut conn = self.acquire(ctx).await?;
        settle("ping", ctx.run(conn.ping()).await)
    }
}

#[async_trait]
impl Db for PgDb {
    async fn close(&self) {
        if !self.pool.is_closed() {
            debug_log!("closing database pool");
        }
        self.pool.close().await;
    }
}
