//! Redis-backed cache store
//!
//! Uses a `ConnectionManager` (auto-reconnecting, cheap to clone) and bounds
//! every command with a per-call timeout so a slow Redis cannot stall a
//! request. Dropping a pending call cancels it locally.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use super::{ttl_secs, CacheError, CacheResult, CacheStore};

/// Startup connection attempts before giving up
const CONNECT_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    /// Connect to Redis, retrying with exponential backoff.
    pub async fn connect(redis_url: &str, timeout: Duration) -> CacheResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| CacheError::Backend(e.to_string()))?;

        let strategy = ExponentialBackoff::from_millis(100)
            .map(jitter)
            .take(CONNECT_ATTEMPTS);

        let manager = Retry::start(strategy, || {
            let client = client.clone();
            async move {
                ConnectionManager::new(client).await.map_err(|e| {
                    tracing::warn!(error = %e, "Redis connection attempt failed");
                    e
                })
            }
        })
        .await
        .map_err(|e| CacheError::Backend(e.to_string()))?;

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Redis cache connected");
        Ok(Self { manager, timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(op = op, error = %e, "Redis command failed");
                Err(CacheError::Backend(e.to_string()))
            }
            Err(_) => {
                tracing::error!(
                    op = op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                Err(CacheError::Timeout { op })
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut con = self.manager.clone();
        self.bounded("get", async move { con.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut con = self.manager.clone();
        let secs = ttl_secs(ttl);
        self.bounded("set_ex", async move {
            con.set_ex::<_, _, ()>(key, value, secs).await
        })
        .await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut con = self.manager.clone();
        let secs = ttl_secs(ttl);
        self.bounded("set_nx_ex", async move {
            // SET key value NX EX secs replies OK when written, nil otherwise
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(secs)
                .query_async(&mut con)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut con = self.manager.clone();
        self.bounded("delete", async move { con.del::<_, u64>(keys).await })
            .await
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut con = self.manager.clone();
        self.bounded("ping", async move {
            let _: String = redis::cmd("PING").query_async(&mut con).await?;
            Ok(())
        })
        .await
    }
}
