use crate::{Cache, CoreError};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::info;

/// Redis implementation of the Cache port. Lets several API instances
/// share verified identity tokens. Keys are namespaced so the cache can
/// live in a Redis database used by other services.
#[derive(Clone, Debug)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    namespace: String,
    default_ttl_seconds: u64,
}

impl RedisCache {
    /// Connects to the server at `redis_url`.
    pub async fn connect(
        redis_url: &str,
        namespace: &str,
        default_ttl_seconds: u64,
    ) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        info!(namespace, "Redis cache connected.");
        Ok(Self {
            connection,
            namespace: namespace.to_string(),
            default_ttl_seconds,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.connection.clone();
        conn.get(self.key(key))
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<(), CoreError> {
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        // SETEX rejects a zero expiry; a zero ttl means "do not keep".
        if ttl == 0 {
            return self.delete(key).await;
        }
        let mut conn = self.connection.clone();
        conn.set_ex(self.key(key), value, ttl)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        conn.del(self.key(key))
            .await
            .map(|_: usize| ())
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }
}
