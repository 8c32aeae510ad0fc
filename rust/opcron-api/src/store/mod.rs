//! Key-value persistence for the schedule document and the cron lock.
//!
//! The scheduler only ever needs `get`/`set`/`delete` with an optional TTL,
//! so the backend is abstracted behind [`KeyValueStore`]. Production
//! deployments use [`RedisStore`]; when Redis is not configured the server
//! falls back to [`MemoryStore`], which is also what the test suite runs
//! against.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("key-value store operation failed: {0}")]
    Backend(String),
    /// A stored document could not be decoded.
    #[error("stored document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Minimal key-value contract consumed by the scheduler.
///
/// Values are opaque strings; callers serialize/deserialize as needed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` with no expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Store `value` under `key`, expiring after `ttl_secs`.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
