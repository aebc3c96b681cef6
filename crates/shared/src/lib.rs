// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Tollgate shared infrastructure
//!
//! Cache capability, cache key schema, fixed-window rate limiting and the
//! Postgres pool used by the API server.

pub mod cache;
pub mod db;
pub mod rate_limit;

pub use cache::{CacheError, CacheResult, CacheStore, MemoryCache, RedisCache, SharedCache};
pub use db::create_pool;
pub use rate_limit::{unix_now, RateLimitConfig, RateLimitRecord, RateLimitResult, RateLimiter};
