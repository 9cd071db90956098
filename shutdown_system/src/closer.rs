//! Shutdown coordinator
//!
//! Components register cleanup callbacks as they start. At teardown
//! [`Closer::close_all`] runs every registered callback exactly once,
//! concurrently, and waits for all of them. Failures are logged, never
//! returned: shutdown always completes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use config::CloserConfig;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::watch;

use crate::errors::CloserError;
use crate::signal::{self, ShutdownSignal};
use crate::types::CloseFn;

/// Runs registered cleanup callbacks once, on demand or on an OS signal
pub struct Closer {
    closing: AtomicBool,
    /// `None` once drained
    callbacks: Mutex<Option<Vec<CloseFn>>>,
    done: Arc<watch::Sender<bool>>,
    callback_timeout: Option<Duration>,
}

impl std::fmt::Debug for Closer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.registry().as_ref().map(Vec::len);
        f.debug_struct("Closer")
            .field("closing", &self.is_closed())
            .field("pending_callbacks", &pending)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

impl Closer {
    /// Closer without signal handling or callback timeout
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            closing: AtomicBool::new(false),
            callbacks: Mutex::new(Some(Vec::new())),
            done: Arc::new(done),
            callback_timeout: None,
        }
    }

    /// Closer whose callbacks are each bounded by the configured timeout.
    /// Signals in `config` are not installed; see [`Closer::from_config`].
    pub fn with_config(config: &CloserConfig) -> Self {
        let mut closer = Self::new();
        if config.callback_timeout_seconds > 0 {
            closer.callback_timeout = Some(Duration::from_secs(config.callback_timeout_seconds));
        }
        closer
    }

    /// Closer that runs [`close_all`](Self::close_all) when one of `signals`
    /// is received. Must be called from within a Tokio runtime.
    pub fn with_signals(signals: &[ShutdownSignal]) -> Result<Arc<Self>, CloserError> {
        let closer = Arc::new(Self::new());
        closer.listen_for(signals)?;
        Ok(closer)
    }

    /// Closer with the configured timeout and signal handlers
    pub fn from_config(config: &CloserConfig) -> Result<Arc<Self>, CloserError> {
        let signals = ShutdownSignal::parse_all(&config.signals)?;
        let closer = Arc::new(Self::with_config(config));
        closer.listen_for(&signals)?;
        Ok(closer)
    }

    /// Run `close_all` when the first of `signals` arrives.
    ///
    /// The listener holds only a weak reference, so it does not keep the
    /// closer alive. Must be called from within a Tokio runtime.
    pub fn listen_for(self: &Arc<Self>, signals: &[ShutdownSignal]) -> Result<(), CloserError> {
        if signals.is_empty() {
            return Ok(());
        }

        let received = signal::listen(signals)?;
        let closer = Arc::downgrade(self);
        tokio::spawn(async move {
            let sig = received.await;
            tracing::info!(signal = %sig, "shutdown signal received");
            if let Some(closer) = closer.upgrade() {
                closer.close_all().await;
            }
        });
        Ok(())
    }

    /// Register cleanup callbacks. Empty input is a no-op.
    ///
    /// Once `close_all` has started, callbacks are rejected with
    /// [`CloserError::AlreadyClosed`] and never run.
    pub fn add<I>(&self, callbacks: I) -> Result<(), CloserError>
    where
        I: IntoIterator<Item = CloseFn>,
    {
        let callbacks: Vec<CloseFn> = callbacks.into_iter().collect();
        if callbacks.is_empty() {
            return Ok(());
        }

        match self.registry().as_mut() {
            Some(registered) => {
                registered.extend(callbacks);
                Ok(())
            }
            None => {
                tracing::warn!(
                    rejected = callbacks.len(),
                    "closer already closed, callbacks will not run"
                );
                Err(CloserError::AlreadyClosed)
            }
        }
    }

    /// Register one async cleanup function
    pub fn add_fn<F, Fut>(&self, f: F) -> Result<(), CloserError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: CloseFn = Box::new(move || f().boxed());
        self.add([callback])
    }

    /// Run every registered callback once and wait for all of them.
    ///
    /// Only the first call drains the registry; concurrent and later calls
    /// wait until that drain has finished.
    pub async fn close_all(&self) {
        if self
            .closing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.wait().await;
            return;
        }

        let callbacks = self.registry().take().unwrap_or_default();
        debug_log!(count = callbacks.len(), "running close callbacks");

        // Detached, so `done` is published even if this future is dropped
        let handle = tokio::spawn(drain(callbacks, self.callback_timeout, self.done.clone()));
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "close callbacks did not finish");
            self.done.send_replace(true);
        }
    }

    /// Resolves once `close_all` has finished, whatever triggered it
    pub async fn wait(&self) {
        let mut done = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Whether `close_all` has started
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn registry(&self) -> MutexGuard<'_, Option<Vec<CloseFn>>> {
        // Callbacks never run under the lock, so a poisoned registry is still consistent
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn drain(callbacks: Vec<CloseFn>, timeout: Option<Duration>, done: Arc<watch::Sender<bool>>) {
    let tasks: Vec<_> = callbacks
        .into_iter()
        .map(|callback| tokio::spawn(run_callback(callback, timeout)))
        .collect();

    for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(callback = index, error = %err, "error returned from close callback");
            }
            Err(err) => {
                tracing::error!(callback = index, error = %err, "close callback panicked");
            }
        }
    }

    done.send_replace(true);
    debug_log!("close callbacks finished");
}

async fn run_callback(callback: CloseFn, timeout: Option<Duration>) -> anyhow::Result<()> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, callback()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("close callback timed out after {limit:?}")),
        },
        None => callback().await,
    }
}

static GLOBAL: LazyLock<Closer> = LazyLock::new(Closer::new);

/// Process-wide closer for applications that do not pass one around
pub fn global() -> &'static Closer {
    &GLOBAL
}

/// Register `callbacks` on the [`global`] closer
pub fn add<I>(callbacks: I) -> Result<(), CloserError>
where
    I: IntoIterator<Item = CloseFn>,
{
    GLOBAL.add(callbacks)
}

/// Run the [`global`] closer's callbacks
pub async fn close_all() {
    GLOBAL.close_all().await;
}

/// Wait for the [`global`] closer to finish
pub async fn wait() {
    GLOBAL.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Barrier;

    fn counting(counter: &Arc<AtomicUsize>) -> CloseFn {
        let counter = counter.clone();
        Box::new(move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_each_callback_runs_once() {
        let closer = Arc::new(Closer::new());
        let counter = Arc::new(AtomicUsize::new(0));
        closer
            .add((0..3).map(|_| counting(&counter)))
            .unwrap();

        tokio::join!(closer.close_all(), closer.close_all());
        closer.close_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(closer.is_closed());
    }

    #[tokio::test]
    async fn test_add_after_close_is_rejected() {
        let closer = Closer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        closer.close_all().await;

        let err = closer.add([counting(&counter)]).unwrap_err();
        assert!(matches!(err, CloserError::AlreadyClosed));
        closer.close_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // Nothing to register, nothing to reject
        closer.add(Vec::<CloseFn>::new()).unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_logged_not_returned() {
        let closer = Closer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        closer
            .add_fn(|| async { Err::<(), _>(anyhow!("flush failed")) })
            .unwrap();
        closer
            .add_fn(|| async {
                let empty: Vec<u8> = Vec::new();
                let _ = empty[1];
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();
        closer.add([counting(&counter)]).unwrap();

        closer.close_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callbacks_run_concurrently() {
        let closer = Closer::new();
        let barrier = Arc::new(Barrier::new(2));
        for _ in 0..2 {
            let barrier = barrier.clone();
            closer
                .add_fn(move || async move {
                    barrier.wait().await;
                    Ok::<(), anyhow::Error>(())
                })
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), closer.close_all())
            .await
            .expect("callbacks waiting on each other must not deadlock");
    }

    #[tokio::test]
    async fn test_slow_callback_is_cut_off() {
        let closer = Closer::with_config(&CloserConfig::new(1, Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        closer
            .add_fn(|| async {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();
        closer.add([counting(&counter)]).unwrap();

        tokio::time::timeout(Duration::from_secs(5), closer.close_all())
            .await
            .expect("timed out callback must not block shutdown");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_resolves_after_close() {
        let closer = Arc::new(Closer::new());
        let waiter = {
            let closer = closer.clone();
            tokio::spawn(async move { closer.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        closer.close_all().await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait must resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_close_still_completes() {
        let closer = Closer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        closer
            .add_fn(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), anyhow::Error>(())
            })
            .unwrap();
        closer.add([counting(&counter)]).unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), closer.close_all()).await;
        assert!(abandoned.is_err());
        assert!(closer.is_closed());

        tokio::time::timeout(Duration::from_secs(2), closer.wait())
            .await
            .expect("wait must resolve after the first close_all was dropped");
        tokio::time::timeout(Duration::from_secs(2), closer.close_all())
            .await
            .expect("later close_all must resolve");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_configured_signal() {
        let config = CloserConfig::new(30, vec!["reload".to_string()]);
        assert!(matches!(
            Closer::from_config(&config),
            Err(CloserError::UnknownSignal(_))
        ));
    }
}
