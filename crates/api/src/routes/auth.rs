//! Authentication endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{
        clear_refresh_cookie, extract_cookie, refresh_cookie, AuthError, AuthUser, ClientInfo,
        IssuedSession, User, REFRESH_COOKIE_NAME,
    },
    error::{ApiError, ApiResult},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// Trimmed, lower-cased email once the payload passes validation
    fn validate(&self) -> Result<String, ApiError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ApiError::Validation("email is required".into()));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(ApiError::Validation("email is invalid".into())),
        }
        if self.password.trim().is_empty() {
            return Err(ApiError::Validation("password is required".into()));
        }
        Ok(email.to_lowercase())
    }
}

/// User profile plus the new access token
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl AuthResponse {
    fn from_session(session: IssuedSession) -> Self {
        Self {
            expires_in: session.tokens.access_expires_at - session.tokens.issued_at,
            user: session.user,
            token: session.tokens.access_token,
            token_type: "Bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i64,
    pub email: String,
    pub token_id: String,
}

/// Body plus a `Set-Cookie` carrying the refresh token
fn session_response(state: &AppState, session: IssuedSession, message: &str) -> Response {
    let cookie = refresh_cookie(
        &session.tokens.refresh_token,
        state.config.refresh_cookie_max_age.as_secs(),
        state.config.refresh_cookie_secure,
    );
    (
        [(SET_COOKIE, cookie)],
        ApiResponse::ok(AuthResponse::from_session(session), message),
    )
        .into_response()
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let email = req.validate()?;

    let session = state
        .auth
        .login(&email, &req.password, &client)
        .await
        .inspect_err(|e| {
            if e.is_rejection() {
                tracing::info!(ip_hash = %client.ip_fingerprint(), "Login rejected");
            }
        })?;

    Ok(session_response(&state, session, "Login successful"))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = extract_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or(AuthError::MissingRefreshToken)?;

    let session = state.auth.refresh(&token, &client).await?;

    Ok(session_response(&state, session, "Token refreshed"))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Response> {
    state.auth.logout(&auth_user).await?;

    Ok((
        [(SET_COOKIE, clear_refresh_cookie(state.config.refresh_cookie_secure))],
        ApiResponse::message("Logged out"),
    )
        .into_response())
}

/// GET /auth/me
pub async fn me(Extension(auth_user): Extension<AuthUser>) -> ApiResponse<MeResponse> {
    ApiResponse::ok(
        MeResponse {
            user_id: auth_user.user_id,
            email: auth_user.email,
            token_id: auth_user.token_id,
        },
        "Authenticated",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validation_accepts_and_normalizes() {
        assert_eq!(request("  A@X.com ", "pw").validate().unwrap(), "a@x.com");
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        for (email, password) in [
            ("", "pw"),
            ("no-at-sign", "pw"),
            ("@x.com", "pw"),
            ("a@", "pw"),
            ("a@x.com", ""),
            ("a@x.com", "   "),
        ] {
            assert!(
                matches!(request(email, password).validate(), Err(ApiError::Validation(_))),
                "expected rejection for {email:?}/{password:?}"
            );
        }
    }
}
