//! Key-value cache capability
//!
//! Every component that needs the external cache receives an
//! `Arc<dyn CacheStore>` explicitly. There is no process-wide client.
//!
//! Reads distinguish "absent or expired" (`Ok(None)`) from a transport
//! failure (`Err(CacheError)`), so callers can map the former to a domain
//! rejection and the latter to an internal error.

pub mod keys;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Shared handle to a cache backend
pub type SharedCache = Arc<dyn CacheStore>;

/// Errors raised by a cache backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache operation '{op}' timed out")]
    Timeout { op: &'static str },

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Whether retrying the same call may succeed.
    ///
    /// Serialization failures are deterministic and never retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CacheError::Timeout { .. } | CacheError::Backend(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Minimal key-value operations the token lifecycle relies on.
///
/// Each individual call is atomic on the backend. Sequences of calls are not.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value. Absent and expired keys both yield `Ok(None)`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value with an expiration, replacing any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Store a value only if the key does not exist yet.
    ///
    /// Returns `true` when this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Delete all given keys in a single operation, returning how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Liveness probe used by the health endpoint.
    async fn ping(&self) -> CacheResult<()>;
}

/// Read and decode a JSON record
pub async fn get_json<T>(cache: &dyn CacheStore, key: &str) -> CacheResult<Option<T>>
where
    T: DeserializeOwned,
{
    match cache.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Encode and write a JSON record with a TTL
pub async fn set_json<T>(cache: &dyn CacheStore, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.set_ex(key, &raw, ttl).await
}

/// Convert a TTL to whole seconds for backends that only accept seconds.
///
/// Rounds up and never returns zero: a zero expiry is rejected by Redis and
/// would otherwise turn into "never expires" in some clients.
pub fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
