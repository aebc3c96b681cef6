//! Fixed-window rate limiting backed by the shared cache
//!
//! One record per `scope:identifier` holds the attempt counter and the
//! absolute end of the current window. The window never slides: a burst at a
//! window boundary can let through up to twice the nominal rate.
//!
//! Cache failures fail open. An outage must not lock legitimate users out of
//! login, which also means the limiter does nothing while the cache is down.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::{get_json, keys, set_json, SharedCache};

/// Stored state of one fixed window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub key: String,
    pub limit: u64,
    pub attempts: u64,
    /// Unix seconds at which the window ends
    pub expires_at: i64,
}

impl RateLimitRecord {
    fn fresh(key: String, limit: u64, now: i64, window_secs: i64) -> Self {
        Self {
            key,
            limit,
            attempts: 1,
            expires_at: now + window_secs,
        }
    }

    fn window_elapsed(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Key scope, e.g. `login:ip`
    pub scope: String,
    /// Attempts allowed per window
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    /// Three login attempts per IP per minute
    pub fn login() -> Self {
        Self {
            scope: keys::LOGIN_IP_SCOPE.to_string(),
            limit: 3,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::login()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// `attempts` is 0 when the counter could not be read
    Allowed { attempts: u64, limit: u64 },
    /// Seconds until the current window resets
    Limited { retry_after: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: SharedCache,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: SharedCache, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one attempt for `identifier` against the current window.
    pub async fn check(&self, identifier: &str) -> RateLimitResult {
        self.check_at(identifier, unix_now()).await
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub async fn check_at(&self, identifier: &str, now: i64) -> RateLimitResult {
        let key = keys::rate_limit_key(&self.config.scope, identifier);
        let window_secs = self.config.window.as_secs().max(1) as i64;

        let existing = match get_json::<RateLimitRecord>(self.cache.as_ref(), &key).await {
            Ok(record) => record,
            Err(e) => {
                // Leave the stored window alone; writing here would reset the count
                tracing::warn!(
                    scope = %self.config.scope,
                    error = %e,
                    "Rate limit read failed, request allowed through (fail-open)"
                );
                return RateLimitResult::Allowed {
                    attempts: 0,
                    limit: self.config.limit,
                };
            }
        };

        let record = match existing {
            Some(mut record) if !record.window_elapsed(now) => {
                record.attempts = record.attempts.saturating_add(1);
                record
            }
            _ => RateLimitRecord::fresh(key.clone(), self.config.limit, now, window_secs),
        };

        let remaining = (record.expires_at - now).max(1) as u64;
        if let Err(e) = set_json(
            self.cache.as_ref(),
            &key,
            &record,
            Duration::from_secs(remaining),
        )
        .await
        {
            tracing::warn!(
                scope = %self.config.scope,
                error = %e,
                "Rate limit write failed, request allowed through (fail-open)"
            );
        }

        if record.attempts > record.limit {
            tracing::debug!(
                scope = %self.config.scope,
                attempts = record.attempts,
                limit = record.limit,
                retry_after = remaining,
                "Rate limit exceeded"
            );
            RateLimitResult::Limited {
                retry_after: remaining,
            }
        } else {
            RateLimitResult::Allowed {
                attempts: record.attempts,
                limit: record.limit,
            }
        }
    }
}

/// Current unix time in whole seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
