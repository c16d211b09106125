//! Redis error types for the local adapter.

use crate::ports::catalog::CatalogError;
use crate::ports::queue::QueueError;
use crate::ports::repository::TrackerError;
use deadpool_redis::CreatePoolError;
use thiserror::Error;

pub type RedisError = deadpool_redis::redis::RedisError;
pub type PoolError = deadpool_redis::PoolError;

#[derive(Debug, Error)]
pub enum RedisAdapterError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Create pool error: {0}")]
    CreatePool(#[from] CreatePoolError),
}

impl From<RedisAdapterError> for QueueError {
    fn from(err: RedisAdapterError) -> Self {
        QueueError::backend(err)
    }
}

impl From<RedisAdapterError> for TrackerError {
    fn from(err: RedisAdapterError) -> Self {
        TrackerError::backend(err)
    }
}

impl From<RedisAdapterError> for CatalogError {
    fn from(err: RedisAdapterError) -> Self {
        CatalogError::backend(err)
    }
}
