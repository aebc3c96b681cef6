//! Login, refresh, logout and access-token checks behind one handle

use tollgate_shared::{unix_now, SharedCache};

use super::directory::SharedDirectory;
use super::error::AuthError;
use super::jwt::{JwtManager, TokenError};
use super::middleware::{AuthUser, ClientInfo};
use super::password::CredentialVerifier;
use super::refresh::{IssuedSession, RefreshCoordinator, SessionTtls};
use super::sessions::SessionCache;
use super::tokens::{token_prefix, TokenIssuer};

#[derive(Clone)]
pub struct AuthService {
    verifier: CredentialVerifier,
    jwt: JwtManager,
    sessions: SessionCache,
    coordinator: RefreshCoordinator,
}

impl AuthService {
    pub fn new(
        cache: SharedCache,
        directory: SharedDirectory,
        jwt: JwtManager,
        ttls: SessionTtls,
        revoke_on_reuse: bool,
    ) -> Self {
        let sessions = SessionCache::new(cache);
        let coordinator = RefreshCoordinator::new(
            sessions.clone(),
            TokenIssuer::new(jwt.clone()),
            directory.clone(),
            ttls,
            revoke_on_reuse,
        );
        Self {
            verifier: CredentialVerifier::new(directory),
            jwt,
            sessions,
            coordinator,
        }
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<IssuedSession, AuthError> {
        let user = self
            .verifier
            .verify(email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let tokens = self
            .coordinator
            .issue_and_save(&user, client, unix_now())
            .await?;

        tracing::info!(
            user_id = %user.id,
            token_id = %tokens.access_token_id,
            "User logged in"
        );
        Ok(IssuedSession { user, tokens })
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<IssuedSession, AuthError> {
        self.coordinator
            .refresh(refresh_token, client, unix_now())
            .await
    }

    /// Validate a bearer access token: signature, expiry, type, then revocation
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.jwt.verify_access_token(access_token).map_err(|e| {
            let prefix = token_prefix(access_token);
            if matches!(e, TokenError::Expired) {
                tracing::debug!(token_prefix = %prefix, "Access token expired");
            } else {
                tracing::warn!(token_prefix = %prefix, error = %e, "Access token rejected");
            }
            AuthError::InvalidToken
        })?;
        let user_id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;

        let record = self
            .sessions
            .get_access_record(access_token)
            .await?
            .ok_or_else(|| {
                tracing::info!(user_id = %user_id, "Access token revoked or expired in cache");
                AuthError::InvalidToken
            })?;

        if record.token_id != claims.jti || record.user_id != user_id {
            tracing::warn!(user_id = %user_id, "Access token record does not match its claims");
            return Err(AuthError::InvalidToken);
        }

        Ok(AuthUser {
            user_id,
            email: record.subject,
            token_id: claims.jti,
            access_token: access_token.to_string(),
        })
    }

    /// End the caller's session. Repeating it is harmless.
    pub async fn logout(&self, user: &AuthUser) -> Result<u64, AuthError> {
        let index = self.sessions.get_session_index(user.user_id).await?;

        let removed = match index {
            Some(index) if index.active_access_token == user.access_token => {
                self.sessions
                    .delete_session(
                        user.user_id,
                        &index.active_access_token,
                        &index.active_refresh_token,
                    )
                    .await?
            }
            // A superseded access token only revokes itself
            _ => self.sessions.revoke_access_token(&user.access_token).await?,
        };

        tracing::info!(user_id = %user.user_id, removed = removed, "User logged out");
        Ok(removed)
    }
}
