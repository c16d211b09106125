//! Redis adapter for local deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `JobQueuePort` with visibility-timeout leases
//! - `StatusTracker` for rendition state
//! - `VideoCatalog` with sequential ids
//!
//! Every multi-key step runs as a Lua script so that a worker dying halfway
//! never leaves a job outside the ready list, the delayed set and the lease
//! set at the same time.

mod catalog;
mod error;
mod keys;
mod pool;
mod queue;
mod tracker;

pub use error::RedisAdapterError;
pub use keys::{Keys, DEFAULT_NAMESPACE};
pub use pool::RedisPool;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Pools on a fresh namespace of the database named by `REDIS_URL`, for
/// the `#[ignore]` integration tests. `None` when the variable is unset.
#[cfg(test)]
pub(crate) mod testing {
    use super::RedisPool;
    use deadpool_redis::redis::AsyncCommands;
    use std::time::Duration;

    pub fn pool(visibility_timeout: Duration) -> Option<RedisPool> {
        let url = std::env::var("REDIS_URL").ok()?;
        let namespace = format!("crooner-test:{}", uuid::Uuid::new_v4().simple());
        Some(RedisPool::with_namespace(&url, visibility_timeout, namespace).unwrap())
    }

    pub async fn flush(pool: &RedisPool) {
        let mut conn = pool.conn().await.unwrap();
        let pattern = format!("{}:*", pool.keys().namespace());
        let keys: Vec<String> = conn.keys(pattern).await.unwrap();
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.unwrap();
        }
    }
}
