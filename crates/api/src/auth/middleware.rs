//! Request-side auth plumbing: client identity, bearer and cookie extraction,
//! the login rate-limit gate and the access-token guard

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE, USER_AGENT},
        request::Parts,
        Extensions, HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tollgate_shared::RateLimitResult;

use super::error::AuthError;
use crate::error::ApiError;
use crate::state::AppState;

/// Name of the cookie carrying the refresh token
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Path the refresh cookie is scoped to
pub const REFRESH_COOKIE_PATH: &str = "/auth";

/// Caller identity recorded with each refresh token and used as the rate
/// limit key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Resolve the caller from the connection peer.
    ///
    /// Forwarding headers are only believed when the peer itself is one of
    /// `trusted_proxies`; anyone else could put any address there.
    fn from_parts(
        headers: &HeaderMap,
        extensions: &Extensions,
        trusted_proxies: &[IpAddr],
    ) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let forwarded = match peer {
            Some(peer) if trusted_proxies.contains(&peer) => extract_ip_address(headers),
            _ => None,
        };

        let ip = forwarded
            .or_else(|| peer.map(|addr| addr.to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self { ip, user_agent }
    }

    pub fn from_request(request: &Request, trusted_proxies: &[IpAddr]) -> Self {
        Self::from_parts(request.headers(), request.extensions(), trusted_proxies)
    }

    /// Log-safe stand-in for the raw IP
    pub fn ip_fingerprint(&self) -> String {
        fingerprint(&self.ip)
    }
}

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(
            &parts.headers,
            &parts.extensions,
            &state.config.trusted_proxies,
        ))
    }
}

/// Authenticated caller, inserted by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub token_id: String,
    pub access_token: String,
}

/// X-Forwarded-For (first hop), then X-Real-IP
fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        if let Some(first) = xff.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Truncated SHA-256 of a value that must not appear in logs verbatim
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..8])
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// Value of cookie `name`, if present and non-empty
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value delivering a refresh token
pub fn refresh_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the refresh cookie
pub fn clear_refresh_cookie(secure: bool) -> String {
    refresh_cookie("", 0, secure)
}

/// Gate in front of login: counts the attempt against the caller's IP.
///
/// Runs before the body is read, so malformed requests count too.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = ClientInfo::from_request(&request, &state.config.trusted_proxies);

    match state.login_limiter.check(&client.ip).await {
        RateLimitResult::Allowed { attempts, limit } => {
            tracing::debug!(
                ip_hash = %client.ip_fingerprint(),
                attempts = attempts,
                limit = limit,
                "Login attempt admitted"
            );
            next.run(request).await
        }
        RateLimitResult::Limited { retry_after } => {
            tracing::warn!(
                ip_hash = %client.ip_fingerprint(),
                retry_after = retry_after,
                "Login rate limit exceeded"
            );
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}

/// Requires a valid, unrevoked access token in `Authorization: Bearer`
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(request.headers()) else {
        tracing::debug!(path = %path, "require_auth: no bearer token");
        return ApiError::from(AuthError::MissingAuth).into_response();
    };

    match state.auth.authenticate(&token).await {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                token_id = %auth_user.token_id,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            if err.is_rejection() {
                tracing::info!(path = %path, error = %err, "require_auth: authentication failed");
            }
            ApiError::from(err).into_response()
        }
    }
}
