//! PostgreSQL transaction handle

use std::any::Any;

use async_trait::async_trait;
use context::Context;
use sqlx::Postgres;
use tokio::sync::{Mutex, MutexGuard};

use crate::errors::DbError;
use crate::transaction::Transaction;

type Inner = Option<sqlx::Transaction<'static, Postgres>>;

/// A pooled connection inside `BEGIN`.
///
/// Statements issued through the same handle are serialized by an async
/// mutex. Commit and rollback take the connection out, so the handle cannot
/// be reused afterwards.
pub struct PgTransaction {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.inner.try_lock() {
            Ok(inner) if inner.is_some() => "open",
            Ok(_) => "finished",
            Err(_) => "busy",
        };
        f.debug_struct("PgTransaction").field("state", &state).finish()
    }
}

impl PgTransaction {
    pub(crate) fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self {
            inner: Mutex::new(Some(tx)),
        }
    }

    /// Wait for exclusive use of the connection, bounded by `ctx`
    pub(crate) async fn lock(&self, ctx: &Context) -> Result<MutexGuard<'_, Inner>, DbError> {
        ctx.run(self.inner.lock())
            .await
            .map_err(DbError::AcquireTimeout)
    }

    async fn take(&self, ctx: &Context) -> Result<sqlx::Transaction<'static, Postgres>, DbError> {
        self.lock(ctx).await?.take().ok_or(DbError::TxFinished)
    }

    async fn finish(&self, ctx: &Context, commit: bool) -> Result<(), DbError> {
        let tx = self.take(ctx).await?;
        let operation = if commit { "commit" } else { "rollback" };

        // A transaction dropped here (context expired mid-call) is rolled
        // back by the driver when the connection returns to the pool
        let outcome = if commit {
            ctx.run(tx.commit()).await
        } else {
            ctx.run(tx.rollback()).await
        };

        match outcome {
            Ok(Ok(())) => {
                debug_log!(operation, "transaction finished");
                Ok(())
            }
            Ok(Err(source)) => Err(DbError::Transaction { operation, source }),
            Err(source) => Err(DbError::Interrupted {
                query: operation.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&self, ctx: &Context) -> Result<(), DbError> {
        self.finish(ctx, true).await
    }

    async fn rollback(&self, ctx: &Context) -> Result<(), DbError> {
        self.finish(ctx, false).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
