//! Core platform wiring
//!
//! [`Platform`] builds the database pool, the cache client, the transaction
//! manager and the closer from one [`AppConfig`], and registers both stores
//! with the closer so a single `shutdown` releases everything.

use std::sync::Arc;

use cache_system::{CacheClient, RedisClient};
use config::AppConfig;
use context::Context;
use db_system::{Db, DbClient, PgClient, Pinger, TxManager};
use shutdown_system::Closer;

use crate::errors::PlatformError;

/// Assembled infrastructure of one service
#[derive(Debug)]
pub struct Platform {
    config: AppConfig,
    db: Arc<PgClient>,
    cache: Arc<RedisClient>,
    tx_manager: TxManager,
    closer: Arc<Closer>,
}

impl Platform {
    /// Connect to both stores and verify them, bounded by `ctx`.
    ///
    /// Must be called from within a Tokio runtime when signals are configured.
    pub async fn new(ctx: &Context, config: AppConfig) -> Result<Self, PlatformError> {
        config.validate()?;

        let db = PgClient::connect(ctx, &config.database).await?;
        let cache = match RedisClient::new(&config.cache) {
            Ok(cache) => cache,
            Err(err) => {
                db.close().await;
                return Err(err.into());
            }
        };
        if let Err(err) = cache.ping(ctx).await {
            db.close().await;
            cache.close().await;
            return Err(err.into());
        }

        Self::assemble(config, db, cache)
    }

    /// Build the platform without connecting; both stores connect on first use
    pub fn new_lazy(config: AppConfig) -> Result<Self, PlatformError> {
        config.validate()?;

        let db = PgClient::connect_lazy(&config.database)?;
        let cache = RedisClient::new(&config.cache)?;
        Self::assemble(config, db, cache)
    }

    fn assemble(config: AppConfig, db: PgClient, cache: RedisClient) -> Result<Self, PlatformError> {
        let closer = Closer::from_config(&config.closer)?;
        let db = Arc::new(db);
        let cache = Arc::new(cache);

        {
            let db = db.clone();
            closer.add_fn(move || async move {
                DbClient::close(db.as_ref()).await;
                Ok::<(), anyhow::Error>(())
            })?;
        }
        {
            let cache = cache.clone();
            closer.add_fn(move || async move {
                cache.close().await;
                Ok::<(), anyhow::Error>(())
            })?;
        }

        let tx_manager = TxManager::new(db.transactor());
        debug_log!(
            database = %config.database.database,
            cache = %config.cache.address(),
            "platform assembled"
        );

        Ok(Self {
            config,
            db,
            cache,
            tx_manager,
            closer,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db(&self) -> Arc<dyn Db> {
        self.db.db()
    }

    pub fn db_client(&self) -> Arc<PgClient> {
        self.db.clone()
    }

    pub fn cache(&self) -> Arc<dyn CacheClient> {
        self.cache.clone()
    }

    pub fn tx_manager(&self) -> &TxManager {
        &self.tx_manager
    }

    /// The closer the stores are registered with; add your own cleanup here
    pub fn closer(&self) -> Arc<Closer> {
        self.closer.clone()
    }

    /// Ping the database and the cache
    pub async fn health_check(&self, ctx: &Context) -> Result<(), PlatformError> {
        self.db.db().ping(ctx).await?;
        self.cache.ping(ctx).await?;
        Ok(())
    }

    /// Run every registered close callback and wait for them
    pub async fn shutdown(&self) {
        self.closer.close_all().await;
    }
}
