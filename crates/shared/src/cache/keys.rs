//! Cache key schema
//!
//! | Key                          | Value              |
//! |------------------------------|--------------------|
//! | `auth:jwt:<accessToken>`     | access token record|
//! | `auth:refresh:<refreshToken>`| refresh record     |
//! | `auth:user:<userId>`         | session index      |
//! | `auth:rotate:<refreshToken>` | rotation claim     |
//! | `rate_limit:login:ip:<ip>`   | rate limit record  |

use std::fmt::Display;

const ACCESS_PREFIX: &str = "auth:jwt:";
const REFRESH_PREFIX: &str = "auth:refresh:";
const USER_PREFIX: &str = "auth:user:";
const ROTATE_PREFIX: &str = "auth:rotate:";
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// Scope of the per-IP login limiter
pub const LOGIN_IP_SCOPE: &str = "login:ip";

pub fn access_token_key(token: &str) -> String {
    format!("{ACCESS_PREFIX}{token}")
}

pub fn refresh_token_key(token: &str) -> String {
    format!("{REFRESH_PREFIX}{token}")
}

pub fn user_index_key(user_id: impl Display) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Short-lived claim taken by whoever rotates a given refresh token first
pub fn rotation_lock_key(refresh_token: &str) -> String {
    format!("{ROTATE_PREFIX}{refresh_token}")
}

/// `rate_limit:<scope>:<identifier>`
pub fn rate_limit_key(scope: &str, identifier: &str) -> String {
    format!("{RATE_LIMIT_PREFIX}{scope}:{identifier}")
}

pub fn login_rate_limit_key(ip: &str) -> String {
    rate_limit_key(LOGIN_IP_SCOPE, ip)
}
