//! Bounded access to the shared Redis connection
//!
//! One multiplexed connection is established lazily and shared. A semaphore
//! of `max_active` permits bounds how many commands may use it at once, and
//! acquiring a permit plus the connection is limited by the earlier of the
//! caller's deadline and the configured connection timeout.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use config::CacheConfig;
use context::Context;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

use crate::errors::CacheError;

struct Slot<C = MultiplexedConnection> {
    connection: C,
    last_used: Instant,
    generation: u64,
}

/// Empty `slot` only if it still holds the connection opened as `generation`
fn take_generation<C>(slot: &mut Option<Slot<C>>, generation: u64) -> Option<Slot<C>> {
    match slot {
        Some(current) if current.generation == generation => slot.take(),
        _ => None,
    }
}

/// Permit-bounded pool over one lazily opened multiplexed connection
pub struct ConnectionPool {
    client: Client,
    permits: Arc<Semaphore>,
    slot: RwLock<Option<Slot>>,
    generations: AtomicU64,
    connection_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection_status = match self.slot.try_read() {
            Ok(slot) if slot.is_some() => "connected",
            Ok(_) => "no_connection",
            Err(_) => "busy",
        };

        f.debug_struct("ConnectionPool")
            .field("available_permits", &self.permits.available_permits())
            .field("closed", &self.permits.is_closed())
            .field("connection_timeout", &self.connection_timeout)
            .field("connected", &connection_status)
            .finish()
    }
}

/// A connection checked out of the pool; the permit returns on drop
pub struct PooledConnection {
    connection: MultiplexedConnection,
    generation: u64,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Identifies the shared connection this checkout came from
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for PooledConnection {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

impl ConnectionPool {
    pub fn new(client: Client, config: &CacheConfig) -> Self {
        let idle_timeout =
            (config.idle_timeout_seconds > 0).then(|| Duration::from_secs(config.idle_timeout_seconds));

        Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_active as usize)),
            slot: RwLock::new(None),
            generations: AtomicU64::new(0),
            connection_timeout: Duration::from_millis(config.connection_timeout_ms),
            idle_timeout,
        }
    }

    /// Check out a connection, bounded by `ctx` and the connection timeout
    pub async fn get(&self, ctx: &Context) -> Result<PooledConnection, CacheError> {
        let bounded = ctx.with_timeout(self.connection_timeout);
        match bounded.run(self.acquire()).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "failed to get redis connection");
                Err(CacheError::AcquireTimeout(err))
            }
        }
    }

    async fn acquire(&self) -> Result<PooledConnection, CacheError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CacheError::PoolClosed)?;

        let (connection, generation) = self.connection().await?;
        Ok(PooledConnection {
            connection,
            generation,
            _permit: permit,
        })
    }

    /// Get or create the shared connection
    async fn connection(&self) -> Result<(MultiplexedConnection, u64), CacheError> {
        let mut slot = self.slot.write().await;

        if let Some(current) = slot.as_mut() {
            let idle = self
                .idle_timeout
                .is_some_and(|limit| current.last_used.elapsed() > limit);
            if !idle {
                current.last_used = Instant::now();
                return Ok((current.connection.clone(), current.generation));
            }
            debug_log!("redis connection idle for too long, reconnecting");
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "failed to open redis connection");
                CacheError::ConnectionAcquireFailed(err)
            })?;

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(Slot {
            connection: connection.clone(),
            last_used: Instant::now(),
            generation,
        });
        Ok((connection, generation))
    }

    /// Forget the shared connection opened as `generation` so the next
    /// checkout reconnects. A newer connection is left in place.
    pub async fn invalidate(&self, generation: u64) {
        if take_generation(&mut *self.slot.write().await, generation).is_some() {
            debug_log!(generation, "dropped broken redis connection");
        }
    }

    /// Refuse new checkouts and drop the shared connection. Idempotent.
    pub async fn close(&self) {
        self.permits.close();
        self.slot.write().await.take();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::ContextError;

    fn pool(host: &str, connection_timeout_ms: u64) -> ConnectionPool {
        let config = CacheConfig {
            host: host.to_string(),
            connection_timeout_ms,
            max_active: 1,
            ..CacheConfig::default()
        };
        let client = Client::open(config.redis_url()).unwrap();
        ConnectionPool::new(client, &config)
    }

    #[tokio::test]
    async fn test_canceled_context_times_out() {
        let pool = pool("localhost", 3_000);
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let err = pool.get(&ctx).await.err().expect("checkout must fail");
        assert!(matches!(err, CacheError::AcquireTimeout(ContextError::Canceled)));
    }

    #[tokio::test]
    async fn test_connection_timeout_bounds_unreachable_server() {
        let pool = pool("10.255.255.1", 150);

        let started = std::time::Instant::now();
        let err = pool
            .get(&Context::background())
            .await
            .err()
            .expect("checkout must fail");

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            CacheError::AcquireTimeout(ContextError::DeadlineExceeded)
        ));
    }

    fn slot(generation: u64) -> Option<Slot<&'static str>> {
        Some(Slot {
            connection: "conn",
            last_used: Instant::now(),
            generation,
        })
    }

    #[test]
    fn test_broken_connection_is_dropped() {
        let mut current = slot(3);
        assert!(take_generation(&mut current, 3).is_some());
        assert!(current.is_none());
    }

    #[test]
    fn test_newer_connection_survives_stale_invalidation() {
        let mut current = slot(4);
        assert!(take_generation(&mut current, 3).is_none());
        assert_eq!(current.map(|slot| slot.generation), Some(4));

        let mut empty: Option<Slot<&'static str>> = None;
        assert!(take_generation(&mut empty, 1).is_none());
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_checkout() {
        let pool = pool("localhost", 3_000);
        pool.close().await;
        pool.close().await;

        assert!(pool.is_closed());
        let err = pool
            .get(&Context::background())
            .await
            .err()
            .expect("checkout must fail");
        assert!(matches!(err, CacheError::PoolClosed));
    }
}
