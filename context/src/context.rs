//! Context implementation
//!
//! Contexts are immutable: every `with_*` method returns a child and leaves
//! the receiver untouched, so a value attached further down a call chain is
//! never visible to the callers above it.

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::ContextError;

/// Ambient carrier of cancellation, deadline and typed values
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Option<Arc<ValueNode>>,
}

/// One link of the value chain. Lookups walk from the newest link to the root.
struct ValueNode {
    key: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<ValueNode>>,
}

/// Cancels the context returned together with it by [`Context::with_cancel`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel the associated context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut depth = 0;
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            depth += 1;
            node = current.parent.as_deref();
        }

        f.debug_struct("Context")
            .field("canceled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("values", &depth)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Root context: never canceled, no deadline, no values
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: None,
        }
    }

    /// Child context that is canceled by the returned handle or by any ancestor
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.token.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: self.deadline,
            values: self.values.clone(),
        };
        (ctx, CancelHandle { token })
    }

    /// Child context that expires after `timeout`, or earlier if the parent does
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context that expires at `deadline`, or earlier if the parent does
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };

        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
            values: self.values.clone(),
        }
    }

    /// Child context carrying `value` under the key type `K`.
    ///
    /// Keys are types, so a crate that keeps its key type private owns the
    /// slot exclusively. A later value under the same key shadows the earlier
    /// one for the child only.
    pub fn with_value<K, V>(&self, value: V) -> Self
    where
        K: 'static,
        V: Any + Send + Sync,
    {
        let node = ValueNode {
            key: TypeId::of::<K>(),
            value: Arc::new(value),
            parent: self.values.clone(),
        };

        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            values: Some(Arc::new(node)),
        }
    }

    /// Look up the nearest value stored under `K`; `None` if absent or not a `V`
    pub fn value<K, V>(&self) -> Option<&V>
    where
        K: 'static,
        V: Any + Send + Sync,
    {
        let key = TypeId::of::<K>();
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            if current.key == key {
                return current.value.downcast_ref::<V>();
            }
            node = current.parent.as_deref();
        }
        None
    }

    /// Same values, but no deadline and no cancellation.
    ///
    /// Cleanup that must run even after the caller gave up (rolling back a
    /// transaction, returning a connection) uses a detached context.
    pub fn detached(&self) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: self.values.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ContextError::Canceled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }

    /// Drive `fut` until it completes or the context is done.
    ///
    /// An already expired context returns immediately without polling `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RequestId;
    struct Tenant;

    #[test]
    fn test_background_is_live() {
        let ctx = Context::background();
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_values_are_scoped_to_children() {
        let root = Context::background();
        let child = root.with_value::<RequestId, _>(42u64);
        let grandchild = child.with_value::<Tenant, _>("acme".to_string());

        assert_eq!(root.value::<RequestId, u64>(), None);
        assert_eq!(child.value::<RequestId, u64>(), Some(&42));
        assert_eq!(grandchild.value::<RequestId, u64>(), Some(&42));
        assert_eq!(
            grandchild.value::<Tenant, String>().map(String::as_str),
            Some("acme")
        );
        assert_eq!(child.value::<Tenant, String>(), None);
    }

    #[test]
    fn test_value_shadowing_and_type_mismatch() {
        let ctx = Context::background()
            .with_value::<RequestId, _>(1u64)
            .with_value::<RequestId, _>(2u64);
        assert_eq!(ctx.value::<RequestId, u64>(), Some(&2));

        // Same key, different value type: the lookup fails instead of guessing
        assert_eq!(ctx.value::<RequestId, u32>(), None);
    }

    #[test]
    fn test_cancel_propagates_to_descendants_only() {
        let root = Context::background();
        let (parent, cancel) = root.with_cancel();
        let child = parent.with_value::<RequestId, _>(7u64);

        cancel.cancel();

        assert_eq!(parent.err(), Some(ContextError::Canceled));
        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert_eq!(root.err(), None);
    }

    #[test]
    fn test_deadline_keeps_the_earlier_one() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let later = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(later.deadline(), ctx.deadline());

        let sooner = later.with_timeout(Duration::from_millis(10));
        assert!(sooner.deadline() < ctx.deadline());
    }

    #[test]
    fn test_detached_drops_cancellation_but_keeps_values() {
        let (ctx, cancel) = Context::background()
            .with_value::<RequestId, _>(9u64)
            .with_timeout(Duration::from_millis(1))
            .with_cancel();
        cancel.cancel();

        let detached = ctx.detached();
        assert_eq!(detached.err(), None);
        assert!(detached.deadline().is_none());
        assert_eq!(detached.value::<RequestId, u64>(), Some(&9));
    }

    #[tokio::test]
    async fn test_run_completes_when_live() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        let result = ctx.run(async { 1 + 1 }).await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_run_stops_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let started = std::time::Instant::now();

        let result = ctx.run(std::future::pending::<()>()).await;

        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_run_on_canceled_context_does_not_poll() {
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = ctx
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        assert_eq!(result, Err(ContextError::Canceled));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_run() {
        let (ctx, cancel) = Context::background().with_cancel();

        let waiter = tokio::spawn(async move { ctx.run(std::future::pending::<()>()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("run should return after cancel")
            .expect("task should not panic");
        assert_eq!(result, Err(ContextError::Canceled));
    }
}
