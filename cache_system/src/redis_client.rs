//! Redis implementation of the cache contract

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use config::CacheConfig;
use context::Context;
use redis::{Client, Cmd, FromRedisValue, RedisError};

use crate::client::CacheClient;
use crate::commands;
use crate::errors::CacheError;
use crate::pool::ConnectionPool;

/// Redis-backed cache client
#[derive(Debug)]
pub struct RedisClient {
    pool: ConnectionPool,
}

impl RedisClient {
    /// Create a client; no connection is opened until the first command
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.redis_url()).map_err(CacheError::Connect)?;
        Ok(Self {
            pool: ConnectionPool::new(client, config),
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Release the connection and refuse further commands
    pub async fn close(&self) {
        debug_log!("closing redis connection pool");
        self.pool.close().await;
    }

    /// Run one command on a pooled connection, bounded by `ctx`
    async fn execute<T>(&self, ctx: &Context, command: &'static str, cmd: Cmd) -> Result<T, CacheError>
    where
        T: FromRedisValue + Send,
    {
        trace_log!(command, "redis command");
        let mut conn = self.pool.get(ctx).await?;
        let generation = conn.generation();
        let outcome = ctx.run(cmd.query_async::<T>(&mut *conn)).await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                if is_broken_connection(&source) {
                    self.pool.invalidate(generation).await;
                }
                Err(CacheError::CacheTransportFailed { command, source })
            }
            Err(source) => Err(CacheError::Interrupted { command, source }),
        }
    }
}

fn is_broken_connection(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

#[async_trait]
impl CacheClient for RedisClient {
    async fn set(&self, ctx: &Context, key: &str, value: &str) -> Result<(), CacheError> {
        self.execute(ctx, "SET", commands::set(key, value)).await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Option<String>, CacheError> {
        self.execute(ctx, "GET", commands::get(key)).await
    }

    async fn hash_set(&self, ctx: &Context, key: &str, fields: &[(&str, &str)]) -> Result<(), CacheError> {
        // HSET without fields is a syntax error on the server
        if fields.is_empty() {
            return Ok(());
        }
        self.execute(ctx, "HSET", commands::hash_set(key, fields)).await
    }

    async fn hget_all(&self, ctx: &Context, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.execute(ctx, "HGETALL", commands::hget_all(key)).await
    }

    async fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.execute(ctx, "EXPIRE", commands::expire(key, ttl)).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), CacheError> {
        self.execute(ctx, "DEL", commands::delete(key)).await
    }

    async fn ping(&self, ctx: &Context) -> Result<(), CacheError> {
        let _pong: String = self.execute(ctx, "PING", commands::ping()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::ContextError;

    fn client() -> RedisClient {
        RedisClient::new(&CacheConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_expired_context_fails_before_any_command() {
        let redis = client();
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let err = redis.get(&ctx, "user:1").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, CacheError::AcquireTimeout(ContextError::Canceled)));
    }

    #[tokio::test]
    async fn test_empty_hash_set_needs_no_connection() {
        let redis = client();
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        redis.hash_set(&ctx, "user:1", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_after_close_are_refused() {
        let redis = client();
        redis.close().await;

        let err = redis.ping(&Context::background()).await.unwrap_err();
        assert!(matches!(err, CacheError::PoolClosed));
    }
}
