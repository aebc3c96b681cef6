use tollgate_shared::CacheError;

use super::directory::DirectoryError;
use super::jwt::TokenError;

/// Outcome of a failed login, refresh, logout or access check.
///
/// Rejections (bad credentials, dead tokens) and dependency failures are
/// separate variants; the HTTP layer maps the first to 401 and the second
/// to 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token reuse detected")]
    RefreshTokenReused,

    #[error("User not found")]
    UserNotFound,

    #[error("Missing refresh token")]
    MissingRefreshToken,

    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AuthError {
    /// Whether this is a rejection of the caller rather than an internal fault
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            AuthError::Cache(_) | AuthError::Directory(_) | AuthError::Token(_)
        )
    }
}
