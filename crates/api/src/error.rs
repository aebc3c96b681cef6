//! HTTP error type and its JSON envelope

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tollgate_shared::CacheError;

use crate::auth::{AuthError, DirectoryError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token reuse detected")]
    RefreshTokenReused,

    #[error("Missing refresh token")]
    MissingRefreshToken,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::InvalidRefreshToken
            | ApiError::RefreshTokenReused
            | ApiError::MissingRefreshToken
            | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Cache(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for clients
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            ApiError::RefreshTokenReused => "REFRESH_TOKEN_REUSED",
            ApiError::MissingRefreshToken => "MISSING_REFRESH_TOKEN",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Cache(_) => "CACHE_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::InvalidCredentials => "Invalid email or password".to_string(),
            ApiError::InvalidRefreshToken | ApiError::RefreshTokenReused => {
                "Invalid or expired refresh token".to_string()
            }
            ApiError::MissingRefreshToken => "Refresh token is required".to_string(),
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::RateLimited { .. } => {
                "Too many login attempts, please try again later".to_string()
            }
            ApiError::Cache(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Dependency details stay in the logs
        match &self {
            ApiError::Cache(detail) | ApiError::Database(detail) | ApiError::Internal(detail) => {
                tracing::error!(error_code = self.error_code(), error = %detail, "Request failed");
            }
            _ => {}
        }

        let mut body = json!({
            "success": false,
            "message": self.client_message(),
            "error_code": self.error_code(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let ApiError::RateLimited { retry_after } = self {
            body["retry_after"] = json!(retry_after);
            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            return response;
        }

        (status, Json(body)).into_response()
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Cache(err.to_string())
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        ApiError::Database(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            // A token that outlived its account reads the same as any dead token
            AuthError::InvalidRefreshToken | AuthError::UserNotFound => {
                ApiError::InvalidRefreshToken
            }
            AuthError::RefreshTokenReused => ApiError::RefreshTokenReused,
            AuthError::MissingRefreshToken => ApiError::MissingRefreshToken,
            AuthError::MissingAuth | AuthError::InvalidToken => ApiError::Unauthorized,
            AuthError::Cache(e) => e.into(),
            AuthError::Directory(e) => e.into(),
            AuthError::Token(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;

    async fn error_response(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        let (status, body) = error_response(ApiError::Cache(
            "Redis connection refused at 10.0.0.5:6379".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "CACHE_ERROR");
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");

        let (_, body) = error_response(ApiError::RateLimited { retry_after: 42 }).await;
        assert_eq!(body["retry_after"], 42);
        assert_eq!(body["error_code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_validation_message_passes_through() {
        let (status, body) =
            error_response(ApiError::Validation("email is invalid".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "email is invalid");
        assert!(body.get("retry_after").is_none());
        assert!(body["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_refresh_failures_share_one_message() {
        let (invalid_status, invalid) = error_response(ApiError::InvalidRefreshToken).await;
        let (reused_status, reused) = error_response(ApiError::RefreshTokenReused).await;
        assert_eq!(invalid_status, StatusCode::UNAUTHORIZED);
        assert_eq!(reused_status, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid["message"], reused["message"]);
    }

    #[test]
    fn test_auth_error_mapping() {
        assert!(matches!(
            ApiError::from(AuthError::UserNotFound),
            ApiError::InvalidRefreshToken
        ));
        assert!(matches!(
            ApiError::from(AuthError::InvalidToken),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from(AuthError::Cache(CacheError::Timeout { op: "get" })),
            ApiError::Cache(_)
        ));
        assert!(matches!(
            ApiError::from(AuthError::Directory(DirectoryError::Timeout)),
            ApiError::Database(_)
        ));
        assert!(matches!(
            ApiError::from(AuthError::Token(TokenError::Signing("no key".into()))),
            ApiError::Internal(_)
        ));
    }
}
