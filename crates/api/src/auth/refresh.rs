//! Refresh token rotation with reuse detection
//!
//! lookup -> resolve user -> reuse check -> claim rotation -> issue -> save
//!
//! A rotated refresh token keeps its record until its own TTL runs out. The
//! record is what lets a replay be recognised: it still resolves to a user
//! whose session index now points at a newer token.

use std::time::Duration;

use subtle::ConstantTimeEq;

use super::directory::{SharedDirectory, User};
use super::error::AuthError;
use super::middleware::ClientInfo;
use super::sessions::{AccessTokenRecord, RefreshTokenRecord, SessionCache};
use super::tokens::{token_prefix, IssuedTokens, TokenIssuer};

/// Lifetime of a rotation claim; a rotation finishes well within it
pub const ROTATION_LOCK_TTL: Duration = Duration::from_secs(10);

/// A freshly issued session for a known user
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub tokens: IssuedTokens,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTtls {
    pub access: Duration,
    pub refresh: Duration,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    sessions: SessionCache,
    issuer: TokenIssuer,
    directory: SharedDirectory,
    ttls: SessionTtls,
    revoke_on_reuse: bool,
}

impl RefreshCoordinator {
    pub fn new(
        sessions: SessionCache,
        issuer: TokenIssuer,
        directory: SharedDirectory,
        ttls: SessionTtls,
        revoke_on_reuse: bool,
    ) -> Self {
        Self {
            sessions,
            issuer,
            directory,
            ttls,
            revoke_on_reuse,
        }
    }

    pub async fn refresh(
        &self,
        presented: &str,
        client: &ClientInfo,
        now: i64,
    ) -> Result<IssuedSession, AuthError> {
        if presented.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let prefix = token_prefix(presented);

        let record = self
            .sessions
            .get_refresh_record(presented)
            .await?
            .ok_or_else(|| {
                tracing::info!(refresh_prefix = %prefix, "Refresh token not found or expired");
                AuthError::InvalidRefreshToken
            })?;
        let user_id = record.user_id;

        let user = match self.directory.find_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::warn!(user_id = %user_id, "Refresh token belongs to a missing or inactive user");
                return Err(AuthError::UserNotFound);
            }
        };

        match self.sessions.get_session_index(user_id).await? {
            Some(index) => {
                let is_active = bool::from(
                    index
                        .active_refresh_token
                        .as_bytes()
                        .ct_eq(presented.as_bytes()),
                );
                if !is_active {
                    tracing::warn!(
                        user_id = %user_id,
                        refresh_prefix = %prefix,
                        revoke = self.revoke_on_reuse,
                        "Superseded refresh token presented"
                    );
                    if self.revoke_on_reuse {
                        // Rejection stands even if the teardown fails
                        if let Err(e) = self
                            .sessions
                            .revoke_after_reuse(user_id, &index, presented)
                            .await
                        {
                            tracing::error!(user_id = %user_id, error = %e, "Session revocation after reuse failed");
                        }
                    }
                    return Err(AuthError::RefreshTokenReused);
                }
            }
            None => {
                tracing::warn!(
                    user_id = %user_id,
                    reuse_check = "skipped",
                    "Session index missing, rotating without reuse check"
                );
            }
        }

        if !self
            .sessions
            .claim_rotation(presented, ROTATION_LOCK_TTL)
            .await?
        {
            tracing::warn!(
                user_id = %user_id,
                refresh_prefix = %prefix,
                "Concurrent rotation of the same refresh token rejected"
            );
            return Err(AuthError::RefreshTokenReused);
        }

        let tokens = match self.issue_and_save(&user, client, now).await {
            Ok(tokens) => tokens,
            Err(e) => {
                // Nothing was rotated; a retry of the same token must be able to claim it
                if let Err(release_err) = self.sessions.release_rotation(presented).await {
                    tracing::warn!(
                        user_id = %user_id,
                        refresh_prefix = %prefix,
                        error = %release_err,
                        "Failed to release rotation claim, retries blocked until it expires"
                    );
                }
                tracing::warn!(
                    user_id = %user_id,
                    refresh_prefix = %prefix,
                    error = %e,
                    "Refresh rotation failed"
                );
                return Err(e);
            }
        };
        tracing::info!(
            user_id = %user_id,
            token_id = %tokens.access_token_id,
            "Refresh token rotated"
        );

        Ok(IssuedSession { user, tokens })
    }

    /// Mint a new pair for `user` and persist it as the active session
    pub(crate) async fn issue_and_save(
        &self,
        user: &User,
        client: &ClientInfo,
        now: i64,
    ) -> Result<IssuedTokens, AuthError> {
        let tokens = self.issuer.issue(user.id, now)?;

        let access = AccessTokenRecord {
            token_id: tokens.access_token_id.clone(),
            user_id: user.id,
            subject: user.email.clone(),
            issued_at: now,
        };
        let refresh = RefreshTokenRecord {
            user_id: user.id,
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            issued_at: now,
        };

        self.sessions
            .save_session(
                &tokens.access_token,
                &tokens.refresh_token,
                &access,
                &refresh,
                self.ttls.access,
                self.ttls.refresh,
            )
            .await?;

        Ok(tokens)
    }
}
