//! Transaction manager
//!
//! Runs a unit of work so that every database call made with the context it
//! receives joins one transaction:
//!
//! - a context that already carries a transaction is passed through as is,
//!   so nested calls share the outer transaction and only the outermost call
//!   commits or rolls back;
//! - otherwise a transaction is started, attached to the context, and
//!   committed if the work succeeds or rolled back if it fails, panics, or is
//!   canceled through the context;
//! - a rollback failure is reported together with the error that caused it.
//!
//! ```rust,no_run
//! use db_system::prelude::*;
//! # async fn demo(db: std::sync::Arc<dyn Db>) -> Result<(), TxError> {
//! let manager = TxManager::new(db.clone());
//! let ctx = Context::background();
//!
//! manager
//!     .read_committed(&ctx, move |ctx| async move {
//!         let debit = Query::new("account.debit", "UPDATE accounts SET balance = balance - $1 WHERE id = $2");
//!         db.exec(&ctx, &debit, args![100_i64, 1_i64]).await?;
//!         let credit = Query::new("account.credit", "UPDATE accounts SET balance = balance + $1 WHERE id = $2");
//!         db.exec(&ctx, &credit, args![100_i64, 2_i64]).await?;
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use context::Context;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::contract::Transactor;
use crate::errors::TxError;
use crate::transaction::{tx_from, with_tx, TxHandle, TxOptions};

/// Boxed unit of work for the object-safe [`TxRunner`] interface
pub type Handler = Box<dyn FnOnce(Context) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Object-safe transaction entry point, for wiring through `Arc<dyn TxRunner>`
#[async_trait]
pub trait TxRunner: Send + Sync {
    async fn read_committed(&self, ctx: &Context, handler: Handler) -> Result<(), TxError>;
}

/// Runs units of work inside transactions of a [`Transactor`]
#[derive(Clone)]
pub struct TxManager {
    db: Arc<dyn Transactor>,
}

impl std::fmt::Debug for TxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxManager").finish_non_exhaustive()
    }
}

impl TxManager {
    pub fn new(db: Arc<dyn Transactor>) -> Self {
        Self { db }
    }

    /// Run `work` in a read committed transaction
    pub async fn read_committed<F, Fut, T>(&self, ctx: &Context, work: F) -> Result<T, TxError>
    where
        F: FnOnce(Context) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        self.run_with_isolation(ctx, TxOptions::read_committed(), work)
            .await
    }

    /// Run `work` in a serializable transaction
    pub async fn serializable<F, Fut, T>(&self, ctx: &Context, work: F) -> Result<T, TxError>
    where
        F: FnOnce(Context) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        self.run_with_isolation(ctx, TxOptions::serializable(), work)
            .await
    }

    /// Run `work` in a transaction started with `opts`, or in the caller's
    /// transaction when `ctx` already carries one.
    pub async fn run_with_isolation<F, Fut, T>(
        &self,
        ctx: &Context,
        opts: TxOptions,
        work: F,
    ) -> Result<T, TxError>
    where
        F: FnOnce(Context) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        if tx_from(ctx).is_some() {
            debug_log!("joining the transaction already carried by the context");
            return run_work(ctx.clone(), work)
                .await
                .map_err(TxError::WorkFailed);
        }

        let tx = self
            .db
            .begin_tx(ctx, opts)
            .await
            .map_err(TxError::BeginFailed)?;
        debug_log!(isolation = %opts.isolation, "transaction started");

        let guard = TxGuard::new(tx.clone());
        let outcome = run_work(with_tx(ctx, tx), work).await;
        guard.finish(ctx, outcome).await
    }
}

#[async_trait]
impl TxRunner for TxManager {
    async fn read_committed(&self, ctx: &Context, handler: Handler) -> Result<(), TxError> {
        TxManager::read_committed(self, ctx, handler).await
    }
}

/// Call `work`, turning a panic or the context expiring into an error
async fn run_work<F, Fut, T>(ctx: Context, work: F) -> anyhow::Result<T>
where
    F: FnOnce(Context) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<T>> + Send,
{
    let scope = ctx.clone();
    let guarded = AssertUnwindSafe(async move { scope.run(work(ctx)).await }).catch_unwind();

    match guarded.await {
        Ok(Ok(result)) => result,
        Ok(Err(ctx_err)) => Err(ctx_err.into()),
        Err(panic) => Err(anyhow!("panic recovered: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Owns the commit-or-rollback decision for one transaction.
///
/// `finish` performs exactly one terminal call. If the guard is dropped
/// before `finish` starts (the manager's future was dropped mid-work), the
/// rollback is spawned onto the runtime instead.
struct TxGuard {
    tx: TxHandle,
    armed: bool,
}

impl TxGuard {
    fn new(tx: TxHandle) -> Self {
        Self { tx, armed: true }
    }

    async fn finish<T>(mut self, ctx: &Context, outcome: anyhow::Result<T>) -> Result<T, TxError> {
        // One terminal call, even if this future is dropped while it runs
        self.armed = false;
        match outcome {
            Ok(value) => match self.tx.commit(ctx).await {
                Ok(()) => {
                    debug_log!("transaction committed");
                    Ok(value)
                }
                Err(err) => Err(TxError::CommitFailed(err)),
            },
            Err(cause) => {
                // Cleanup must not be skipped because the caller's context expired
                match self.tx.rollback(&ctx.detached()).await {
                    Ok(()) => {
                        debug_log!(error = %cause, "transaction rolled back");
                        Err(TxError::WorkFailed(cause))
                    }
                    Err(rollback) => {
                        tracing::error!(error = %cause, rollback_error = %rollback, "transaction rollback failed");
                        Err(TxError::RollbackFailed { cause, rollback })
                    }
                }
            }
        }
    }
}

impl Drop for TxGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let tx = self.tx.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("transaction abandoned before completion, rolling back");
                handle.spawn(async move {
                    if let Err(err) = tx.rollback(&Context::background()).await {
                        tracing::error!(error = %err, "failed to roll back abandoned transaction");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("transaction abandoned outside a runtime, leaving rollback to the driver");
            }
        }
    }
}
