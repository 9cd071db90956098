//! Callback types for the shutdown coordinator

use futures::future::BoxFuture;

/// Cleanup callback run once by [`Closer::close_all`](crate::Closer::close_all)
pub type CloseFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;
