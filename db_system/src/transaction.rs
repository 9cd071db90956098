//! Transaction handles and their propagation through [`Context`]
//!
//! The active transaction travels as a context value under a key type that
//! only this module can name. Data-access calls look it up to decide between
//! the transaction and the shared pool; the manager looks it up to detect
//! nesting.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use context::Context;

use crate::errors::DbError;

/// One in-flight transaction, owned by the driver that began it.
///
/// Valid for a single attempt: after `commit` or `rollback` returns, further
/// use fails with [`DbError::TxFinished`].
#[async_trait]
pub trait Transaction: Send + Sync + 'static {
    async fn commit(&self, ctx: &Context) -> Result<(), DbError>;

    async fn rollback(&self, ctx: &Context) -> Result<(), DbError>;

    /// Lets a driver recover its concrete handle type
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to the active transaction
pub type TxHandle = Arc<dyn Transaction>;

struct TxKey;

/// Child context carrying `tx` as the active transaction
pub fn with_tx(ctx: &Context, tx: TxHandle) -> Context {
    ctx.with_value::<TxKey, TxHandle>(tx)
}

/// The active transaction of `ctx`, if any
pub fn tx_from(ctx: &Context) -> Option<&TxHandle> {
    ctx.value::<TxKey, TxHandle>()
}

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn as_sql(self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "READ WRITE",
            AccessMode::ReadOnly => "READ ONLY",
        }
    }
}

/// Options applied when a transaction begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub access_mode: AccessMode,
    /// Only meaningful for serializable, read-only transactions
    pub deferrable: bool,
}

impl TxOptions {
    pub fn new(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    pub fn read_committed() -> Self {
        Self::new(IsolationLevel::ReadCommitted)
    }

    pub fn serializable() -> Self {
        Self::new(IsolationLevel::Serializable)
    }

    pub fn read_only(mut self) -> Self {
        self.access_mode = AccessMode::ReadOnly;
        self
    }

    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    /// `SET TRANSACTION` statement issued right after `BEGIN`
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SET TRANSACTION ISOLATION LEVEL {}, {}",
            self.isolation.as_sql(),
            self.access_mode.as_sql()
        );
        if self.deferrable {
            sql.push_str(", DEFERRABLE");
        }
        sql
    }
}
