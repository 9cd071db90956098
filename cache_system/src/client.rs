//! Cache store contract

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use context::Context;
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::CacheError;

/// Key-value cache operations. Each call makes exactly one attempt.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn set(&self, ctx: &Context, key: &str, value: &str) -> Result<(), CacheError>;

    /// `None` when the key does not exist
    async fn get(&self, ctx: &Context, key: &str) -> Result<Option<String>, CacheError>;

    /// Set several fields of the hash at `key`
    async fn hash_set(&self, ctx: &Context, key: &str, fields: &[(&str, &str)]) -> Result<(), CacheError>;

    /// Every field of the hash at `key`; empty when the key does not exist
    async fn hget_all(&self, ctx: &Context, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Expire `key` after `ttl`, truncated to whole seconds
    async fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), CacheError>;

    async fn ping(&self, ctx: &Context) -> Result<(), CacheError>;
}

/// JSON helpers available on every [`CacheClient`]
#[async_trait]
pub trait CacheClientExt: CacheClient {
    /// Get and deserialize the value at `key`
    async fn get_json<T>(&self, ctx: &Context, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(ctx, key).await? {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it at `key`
    async fn set_json<T>(&self, ctx: &Context, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let json_str = serde_json::to_string(value)?;
        self.set(ctx, key, &json_str).await
    }
}

impl<C> CacheClientExt for C where C: CacheClient + ?Sized {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCache {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CacheClient for MemoryCache {
        async fn set(&self, _ctx: &Context, key: &str, value: &str) -> Result<(), CacheError> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, _ctx: &Context, key: &str) -> Result<Option<String>, CacheError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn hash_set(&self, _ctx: &Context, _key: &str, _fields: &[(&str, &str)]) -> Result<(), CacheError> {
            Ok(())
        }

        async fn hget_all(&self, _ctx: &Context, _key: &str) -> Result<HashMap<String, String>, CacheError> {
            Ok(HashMap::new())
        }

        async fn expire(&self, _ctx: &Context, _key: &str, _ttl: Duration) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete(&self, _ctx: &Context, key: &str) -> Result<(), CacheError> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn ping(&self, _ctx: &Context) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user_id: i64,
        roles: Vec<String>,
    }

    #[tokio::test]
    async fn test_json_helpers_through_trait_object() {
        let cache: Box<dyn CacheClient> = Box::new(MemoryCache::default());
        let ctx = Context::background();
        let session = Session {
            user_id: 7,
            roles: vec!["admin".to_string()],
        };

        cache.set_json(&ctx, "session:7", &session).await.unwrap();
        let loaded: Option<Session> = cache.get_json(&ctx, "session:7").await.unwrap();
        assert_eq!(loaded, Some(session));

        let missing: Option<Session> = cache.get_json(&ctx, "session:8").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_serialization_error() {
        let cache = MemoryCache::default();
        let ctx = Context::background();
        cache.set(&ctx, "session:1", "not json").await.unwrap();

        let err = cache
            .get_json::<Session>(&ctx, "session:1")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
