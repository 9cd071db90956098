//! Pool construction from [`DatabaseConfig`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::DatabaseConfig;
use context::Context;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::db::PgDb;
use crate::contract::{Db, DbClient, Pinger, Transactor};
use crate::errors::DbError;

/// Owner of the PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgClient {
    db: Arc<PgDb>,
}

impl PgClient {
    /// Open the pool and verify it with a ping, bounded by `ctx`
    pub async fn connect(ctx: &Context, config: &DatabaseConfig) -> Result<Self, DbError> {
        let connecting = pool_options(config).connect_with(connect_options(config));
        let pool = match ctx.run(connecting).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(err)) => return Err(DbError::Connect(err)),
            Err(err) => return Err(DbError::AcquireTimeout(err)),
        };

        let client = Self::from_pool(pool);
        if let Err(err) = client.db.ping(ctx).await {
            client.db.close().await;
            return Err(err);
        }

        debug_log!(
            host = %config.host,
            database = %config.database,
            "database pool connected"
        );
        Ok(client)
    }

    /// Build the pool without connecting; connections open on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DbError> {
        let pool = pool_options(config).connect_lazy_with(connect_options(config));
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            db: Arc::new(PgDb::new(pool)),
        }
    }

    /// Concrete handle, for callers that need the pool
    pub fn pg(&self) -> &PgDb {
        &self.db
    }

    /// The same handle as a [`Transactor`], for building a `TxManager`
    pub fn transactor(&self) -> Arc<dyn Transactor> {
        self.db.clone()
    }
}

#[async_trait]
impl DbClient for PgClient {
    fn db(&self) -> Arc<dyn Db> {
        self.db.clone()
    }

    async fn close(&self) {
        self.db.close().await;
    }
}

/// Credentials are passed as fields, so they need no URL escaping
fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));

    if config.max_lifetime_seconds > 0 {
        options = options.max_lifetime(Duration::from_secs(config.max_lifetime_seconds));
    }

    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::ContextError;

    #[tokio::test]
    async fn test_lazy_client_shares_one_pool() {
        let client = PgClient::connect_lazy(&DatabaseConfig::default()).unwrap();
        let first = client.db();
        let second = client.db();
        assert!(Arc::ptr_eq(&first, &second));

        client.close().await;
        assert!(client.pg().pool().is_closed());
    }

    #[test]
    fn test_credentials_with_url_delimiters() {
        let config = DatabaseConfig {
            username: "svc@orders".to_string(),
            password: "p@ss:w/rd".to_string(),
            ..DatabaseConfig::default()
        };

        let options = connect_options(&config);
        assert_eq!(options.get_username(), "svc@orders");
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_database(), Some("platform"));
    }

    #[tokio::test]
    async fn test_connect_respects_expired_context() {
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let err = PgClient::connect(&ctx, &DatabaseConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AcquireTimeout(ContextError::Canceled)));
    }
}
