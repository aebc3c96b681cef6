//! Application state

use std::sync::Arc;

use tollgate_shared::{RateLimitConfig, RateLimiter, SharedCache};

use crate::{
    auth::{AuthService, JwtManager, SessionTtls, SharedDirectory, TokenError},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    /// Per-IP limiter in front of login
    pub login_limiter: RateLimiter,
    /// Injected cache handle, also probed by the health endpoint
    pub cache: SharedCache,
    pub directory: SharedDirectory,
}

impl AppState {
    /// Wire every component to the given cache and user directory
    pub fn new(
        config: Config,
        cache: SharedCache,
        directory: SharedDirectory,
    ) -> Result<Self, TokenError> {
        let jwt = JwtManager::new(&config.jwt_secret, config.access_token_ttl)?;

        let auth = AuthService::new(
            cache.clone(),
            directory.clone(),
            jwt,
            SessionTtls {
                access: config.access_token_ttl,
                refresh: config.refresh_token_ttl,
            },
            config.revoke_on_refresh_reuse,
        );

        let login_limiter = RateLimiter::new(
            cache.clone(),
            RateLimitConfig {
                limit: config.login_rate_limit,
                window: config.login_rate_window,
                ..RateLimitConfig::login()
            },
        );

        Ok(Self {
            config: Arc::new(config),
            auth,
            login_limiter,
            cache,
            directory,
        })
    }
}
