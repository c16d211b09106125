//! Redis connection pool.

use super::error::RedisAdapterError;
use super::keys::{Keys, DEFAULT_NAMESPACE};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::time::Duration;

/// Redis-backed adapter for queue, tracker and catalog operations.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
    keys: Keys,
    pub(super) visibility_timeout: Duration,
}

impl RedisPool {
    /// Create a new RedisPool with connection pool.
    pub fn new(redis_url: &str, visibility_timeout: Duration) -> Result<Self, RedisAdapterError> {
        Self::with_namespace(redis_url, visibility_timeout, DEFAULT_NAMESPACE)
    }

    /// Like `new`, with every key under `namespace`.
    pub fn with_namespace(
        redis_url: &str,
        visibility_timeout: Duration,
        namespace: impl Into<String>,
    ) -> Result<Self, RedisAdapterError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self {
            pool,
            keys: Keys::new(namespace),
            visibility_timeout,
        })
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    pub(super) async fn conn(&self) -> Result<Connection, RedisAdapterError> {
        Ok(self.pool.get().await?)
    }
}
