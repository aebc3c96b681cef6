//! Session cache: the three cached records behind one login
//!
//! A session is an access token record, a refresh token record and the
//! per-user session index. Each lives under its own key with its own TTL;
//! the cache's native expiry is the only expiry check.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tollgate_shared::cache::{get_json, keys, set_json, CacheResult, SharedCache};

use super::tokens::token_prefix;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    pub token_id: String,
    pub user_id: i64,
    /// Login identity, the user's email
    pub subject: String,
    pub issued_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    pub user_id: i64,
    pub ip: String,
    #[serde(rename = "ua")]
    pub user_agent: String,
    pub issued_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    pub active_access_token: String,
    pub active_refresh_token: String,
    pub last_login_at: i64,
}

#[derive(Clone)]
pub struct SessionCache {
    cache: SharedCache,
}

impl SessionCache {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    /// Write the access record, the refresh record and the session index.
    ///
    /// The writes are sequential and not transactional. The first failure is
    /// returned and later writes are skipped; a half-written session never
    /// validates because the index or the refresh record is missing.
    pub async fn save_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        access: &AccessTokenRecord,
        refresh: &RefreshTokenRecord,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> CacheResult<()> {
        let user_id = access.user_id;

        set_json(
            self.cache.as_ref(),
            &keys::access_token_key(access_token),
            access,
            access_ttl,
        )
        .await
        .inspect_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Failed to store access token record");
        })?;

        set_json(
            self.cache.as_ref(),
            &keys::refresh_token_key(refresh_token),
            refresh,
            refresh_ttl,
        )
        .await
        .inspect_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Failed to store refresh token record");
        })?;

        let index = SessionIndex {
            active_access_token: access_token.to_string(),
            active_refresh_token: refresh_token.to_string(),
            last_login_at: access.issued_at,
        };
        // The index must outlive the access token to authorize rotation
        set_json(
            self.cache.as_ref(),
            &keys::user_index_key(user_id),
            &index,
            refresh_ttl,
        )
        .await
        .inspect_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Failed to store session index");
        })?;

        tracing::debug!(
            user_id = %user_id,
            token_id = %access.token_id,
            refresh_prefix = %token_prefix(refresh_token),
            access_ttl_secs = access_ttl.as_secs(),
            refresh_ttl_secs = refresh_ttl.as_secs(),
            "Session saved"
        );
        Ok(())
    }

    pub async fn get_access_record(&self, access_token: &str) -> CacheResult<Option<AccessTokenRecord>> {
        get_json(self.cache.as_ref(), &keys::access_token_key(access_token)).await
    }

    pub async fn get_refresh_record(
        &self,
        refresh_token: &str,
    ) -> CacheResult<Option<RefreshTokenRecord>> {
        get_json(self.cache.as_ref(), &keys::refresh_token_key(refresh_token)).await
    }

    pub async fn get_session_index(&self, user_id: i64) -> CacheResult<Option<SessionIndex>> {
        get_json(self.cache.as_ref(), &keys::user_index_key(user_id)).await
    }

    /// Delete the access record, refresh record and index in one command
    pub async fn delete_session(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: &str,
    ) -> CacheResult<u64> {
        let keys = vec![
            keys::access_token_key(access_token),
            keys::refresh_token_key(refresh_token),
            keys::user_index_key(user_id),
        ];
        let removed = self.cache.delete(&keys).await?;
        tracing::info!(user_id = %user_id, removed = removed, "Session deleted");
        Ok(removed)
    }

    pub async fn revoke_access_token(&self, access_token: &str) -> CacheResult<u64> {
        self.cache
            .delete(&[keys::access_token_key(access_token)])
            .await
    }

    /// Tear down the active session plus the replayed token after reuse
    pub async fn revoke_after_reuse(
        &self,
        user_id: i64,
        index: &SessionIndex,
        replayed_refresh_token: &str,
    ) -> CacheResult<u64> {
        let keys = vec![
            keys::access_token_key(&index.active_access_token),
            keys::refresh_token_key(&index.active_refresh_token),
            keys::user_index_key(user_id),
            keys::refresh_token_key(replayed_refresh_token),
        ];
        let removed = self.cache.delete(&keys).await?;
        tracing::warn!(user_id = %user_id, removed = removed, "Session revoked after refresh token reuse");
        Ok(removed)
    }

    /// Take the one-time right to rotate `refresh_token`.
    ///
    /// Returns `false` when another request already claimed it.
    pub async fn claim_rotation(&self, refresh_token: &str, ttl: Duration) -> CacheResult<bool> {
        self.cache
            .set_nx_ex(&keys::rotation_lock_key(refresh_token), "1", ttl)
            .await
    }

    /// Drop a rotation claim whose rotation never completed
    pub async fn release_rotation(&self, refresh_token: &str) -> CacheResult<()> {
        self.cache
            .delete(&[keys::rotation_lock_key(refresh_token)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tollgate_shared::MemoryCache;

    const ACCESS_TTL: Duration = Duration::from_secs(900);
    const REFRESH_TTL: Duration = Duration::from_secs(86_400);

    fn records(user_id: i64) -> (AccessTokenRecord, RefreshTokenRecord) {
        (
            AccessTokenRecord {
                token_id: "jti-1".into(),
                user_id,
                subject: "a@x.com".into(),
                issued_at: 1_700_000_000,
            },
            RefreshTokenRecord {
                user_id,
                ip: "203.0.113.1".into(),
                user_agent: "test-agent".into(),
                issued_at: 1_700_000_000,
            },
        )
    }

    #[test]
    fn test_record_wire_format() {
        let (access, refresh) = records(5);
        let access_json = serde_json::to_value(&access).unwrap();
        assert_eq!(access_json["tokenId"], "jti-1");
        assert_eq!(access_json["userId"], 5);

        let refresh_json = serde_json::to_value(&refresh).unwrap();
        assert_eq!(refresh_json["ua"], "test-agent");
    }

    #[tokio::test]
    async fn test_save_then_read_all_three() {
        let sessions = SessionCache::new(Arc::new(MemoryCache::new()));
        let (access, refresh) = records(7);

        sessions
            .save_session("at", "rt", &access, &refresh, ACCESS_TTL, REFRESH_TTL)
            .await
            .unwrap();

        assert_eq!(sessions.get_access_record("at").await.unwrap(), Some(access));
        assert_eq!(sessions.get_refresh_record("rt").await.unwrap(), Some(refresh));
        let index = sessions.get_session_index(7).await.unwrap().unwrap();
        assert_eq!(index.active_access_token, "at");
        assert_eq!(index.active_refresh_token, "rt");
        assert_eq!(index.last_login_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_delete_session_removes_every_key() {
        let cache = Arc::new(MemoryCache::new());
        let sessions = SessionCache::new(cache.clone());
        let (access, refresh) = records(7);
        sessions
            .save_session("at", "rt", &access, &refresh, ACCESS_TTL, REFRESH_TTL)
            .await
            .unwrap();

        assert_eq!(sessions.delete_session(7, "at", "rt").await.unwrap(), 3);
        assert!(cache.is_empty().await);
        assert_eq!(sessions.delete_session(7, "at", "rt").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rotation_claim_is_single_use() {
        let sessions = SessionCache::new(Arc::new(MemoryCache::new()));
        let ttl = Duration::from_secs(10);
        assert!(sessions.claim_rotation("rt", ttl).await.unwrap());
        assert!(!sessions.claim_rotation("rt", ttl).await.unwrap());
        assert!(sessions.claim_rotation("other", ttl).await.unwrap());

        sessions.release_rotation("rt").await.unwrap();
        assert!(sessions.claim_rotation("rt", ttl).await.unwrap());
    }
}
