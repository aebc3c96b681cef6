//! Edge case tests for the token lifecycle
//!
//! Tests cover:
//! - Refresh rotation and superseded-token reuse
//! - Optional session teardown on reuse
//! - Missing session index and concurrent rotation
//! - TTL expiry of cached records
//! - Dependency failures versus rejections

#[cfg(test)]
mod rotation_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tollgate_shared::cache::keys;
    use tollgate_shared::{CacheError, CacheResult, CacheStore, MemoryCache};

    use super::super::directory::{InMemoryUserDirectory, User};
    use super::super::error::AuthError;
    use super::super::jwt::JwtManager;
    use super::super::middleware::ClientInfo;
    use super::super::password::hash_password;
    use super::super::refresh::{SessionTtls, ROTATION_LOCK_TTL};
    use super::super::service::AuthService;

    const SECRET: &str = "edge-case-secret-edge-case-secret-0123";
    const ACCESS_TTL: Duration = Duration::from_secs(900);
    const REFRESH_TTL: Duration = Duration::from_secs(86_400);
    const USER_ID: i64 = 11;

    fn client() -> ClientInfo {
        ClientInfo::new("198.51.100.20", "edge-tests/1.0")
    }

    async fn directory() -> InMemoryUserDirectory {
        let directory = InMemoryUserDirectory::new();
        directory
            .insert(User {
                id: USER_ID,
                username: "ada".into(),
                email: "a@x.com".into(),
                password_hash: hash_password("correct").unwrap(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                phone: None,
                country_id: 56,
                address_line: None,
                is_active: true,
            })
            .await;
        directory
    }

    fn service_over(
        cache: Arc<dyn CacheStore>,
        directory: InMemoryUserDirectory,
        revoke_on_reuse: bool,
    ) -> AuthService {
        AuthService::new(
            cache,
            Arc::new(directory),
            JwtManager::new(SECRET, ACCESS_TTL).unwrap(),
            SessionTtls {
                access: ACCESS_TTL,
                refresh: REFRESH_TTL,
            },
            revoke_on_reuse,
        )
    }

    async fn setup(revoke_on_reuse: bool) -> (AuthService, Arc<MemoryCache>, InMemoryUserDirectory) {
        let cache = Arc::new(MemoryCache::new());
        let directory = directory().await;
        let service = service_over(cache.clone(), directory.clone(), revoke_on_reuse);
        (service, cache, directory)
    }

    /// Cache that fails selected operations and delegates the rest
    struct FlakyCache {
        inner: MemoryCache,
        fail_writes_with_prefix: Mutex<Option<&'static str>>,
        fail_reads: bool,
    }

    impl FlakyCache {
        fn new(fail_writes_with_prefix: Option<&'static str>, fail_reads: bool) -> Self {
            Self {
                inner: MemoryCache::new(),
                fail_writes_with_prefix: Mutex::new(fail_writes_with_prefix),
                fail_reads,
            }
        }

        fn fail_writes_with_prefix(&self, prefix: Option<&'static str>) {
            *self.fail_writes_with_prefix.lock().unwrap() = prefix;
        }
    }

    #[async_trait]
    impl CacheStore for FlakyCache {
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            if self.fail_reads {
                return Err(CacheError::Timeout { op: "get" });
            }
            self.inner.get(key).await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
            let failing = *self.fail_writes_with_prefix.lock().unwrap();
            if failing.is_some_and(|prefix| key.starts_with(prefix)) {
                return Err(CacheError::Backend("write refused".into()));
            }
            self.inner.set_ex(key, value, ttl).await
        }
        async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
            self.inner.set_nx_ex(key, value, ttl).await
        }
        async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
            self.inner.delete(keys).await
        }
        async fn ping(&self) -> CacheResult<()> {
            self.inner.ping().await
        }
    }

    // =========================================================================
    // Rotation: R1 -> R2, replayed R1 rejected, R2 -> R3
    // =========================================================================
    #[tokio::test]
    async fn test_rotation_then_reuse_then_continue() {
        let (service, _cache, _) = setup(false).await;

        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let r1 = login.tokens.refresh_token;

        let second = service.refresh(&r1, &client()).await.unwrap();
        let r2 = second.tokens.refresh_token;
        assert_ne!(r1, r2);

        let index = service.sessions().get_session_index(USER_ID).await.unwrap().unwrap();
        assert_eq!(index.active_refresh_token, r2);
        assert_eq!(index.active_access_token, second.tokens.access_token);

        assert!(matches!(
            service.refresh(&r1, &client()).await,
            Err(AuthError::RefreshTokenReused)
        ));

        let third = service.refresh(&r2, &client()).await.unwrap();
        assert_ne!(third.tokens.refresh_token, r2);
        assert_eq!(third.user.id, USER_ID);
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_is_a_rejection() {
        let (service, _, _) = setup(false).await;
        let result = service.refresh("never-issued", &client()).await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
        assert!(result.unwrap_err().is_rejection());
    }

    #[tokio::test]
    async fn test_empty_refresh_token_is_missing() {
        let (service, _, _) = setup(false).await;
        assert!(matches!(
            service.refresh("", &client()).await,
            Err(AuthError::MissingRefreshToken)
        ));
    }

    // =========================================================================
    // Reuse with session teardown enabled
    // =========================================================================
    #[tokio::test]
    async fn test_reuse_revokes_session_when_enabled() {
        let (service, cache, _) = setup(true).await;

        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let r1 = login.tokens.refresh_token;
        let second = service.refresh(&r1, &client()).await.unwrap();

        assert!(matches!(
            service.refresh(&r1, &client()).await,
            Err(AuthError::RefreshTokenReused)
        ));

        // The legitimate holder is logged out as well
        assert!(matches!(
            service.refresh(&second.tokens.refresh_token, &client()).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(matches!(
            service.authenticate(&second.tokens.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(cache
            .get(&keys::user_index_key(USER_ID))
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get(&keys::refresh_token_key(&r1))
            .await
            .unwrap()
            .is_none());
    }

    // =========================================================================
    // Session index evicted: rotate without reuse check
    // =========================================================================
    #[tokio::test]
    async fn test_missing_index_skips_reuse_check() {
        let (service, cache, _) = setup(false).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();

        cache
            .delete(&[keys::user_index_key(USER_ID)])
            .await
            .unwrap();

        let rotated = service
            .refresh(&login.tokens.refresh_token, &client())
            .await
            .unwrap();
        let index = service.sessions().get_session_index(USER_ID).await.unwrap().unwrap();
        assert_eq!(index.active_refresh_token, rotated.tokens.refresh_token);
    }

    // =========================================================================
    // Two requests racing on the same active refresh token
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let (service, _, _) = setup(false).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let r1 = login.tokens.refresh_token;

        let (client_a, client_b) = (client(), client());
        let (a, b) = tokio::join!(
            service.refresh(&r1, &client_a),
            service.refresh(&r1, &client_b)
        );

        let winners: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(winners.len(), 1);

        // The loser did not tear anything down
        let index = service.sessions().get_session_index(USER_ID).await.unwrap().unwrap();
        assert_eq!(index.active_refresh_token, winners[0].tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_claimed_token_is_rejected_without_invalidation() {
        let (service, _, _) = setup(true).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let r1 = login.tokens.refresh_token;

        assert!(service
            .sessions()
            .claim_rotation(&r1, ROTATION_LOCK_TTL)
            .await
            .unwrap());

        assert!(matches!(
            service.refresh(&r1, &client()).await,
            Err(AuthError::RefreshTokenReused)
        ));
        // Index still points at r1, so nothing was revoked
        assert!(service.authenticate(&login.tokens.access_token).await.is_ok());
    }

    // =========================================================================
    // Account removed while its refresh token is still cached
    // =========================================================================
    #[tokio::test]
    async fn test_deleted_user_cannot_refresh() {
        let (service, _, directory) = setup(false).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();

        directory.remove(USER_ID).await;

        assert!(matches!(
            service.refresh(&login.tokens.refresh_token, &client()).await,
            Err(AuthError::UserNotFound)
        ));
    }

    // =========================================================================
    // Native TTL expiry is authoritative
    // =========================================================================
    #[tokio::test(start_paused = true)]
    async fn test_records_expire_with_their_ttls() {
        let (service, _, _) = setup(false).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let sessions = service.sessions();

        tokio::time::advance(ACCESS_TTL - Duration::from_secs(1)).await;
        assert!(sessions
            .get_access_record(&login.tokens.access_token)
            .await
            .unwrap()
            .is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(sessions
            .get_access_record(&login.tokens.access_token)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            service.authenticate(&login.tokens.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        // Index and refresh record outlive the access token
        assert!(sessions.get_session_index(USER_ID).await.unwrap().is_some());
        assert!(sessions
            .get_refresh_record(&login.tokens.refresh_token)
            .await
            .unwrap()
            .is_some());

        tokio::time::advance(REFRESH_TTL).await;
        assert!(sessions.get_session_index(USER_ID).await.unwrap().is_none());
        assert!(matches!(
            service.refresh(&login.tokens.refresh_token, &client()).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    // =========================================================================
    // Dependency failures surface as errors, never as success or rejection
    // =========================================================================
    #[tokio::test]
    async fn test_partial_save_fails_login() {
        let cache = Arc::new(FlakyCache::new(Some("auth:refresh:"), false));
        let service = service_over(cache.clone(), directory().await, false);

        let result = service.login("a@x.com", "correct", &client()).await;
        assert!(matches!(result, Err(AuthError::Cache(_))));
        assert!(!result.unwrap_err().is_rejection());

        // Nothing after the failed write was stored
        assert!(cache.inner.get(&keys::user_index_key(USER_ID)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_rotation_can_be_retried() {
        let cache = Arc::new(FlakyCache::new(None, false));
        let service = service_over(cache.clone(), directory().await, false);
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let r1 = login.tokens.refresh_token;

        cache.fail_writes_with_prefix(Some("auth:jwt:"));
        let failed = service.refresh(&r1, &client()).await;
        assert!(matches!(failed, Err(AuthError::Cache(_))));
        assert!(!failed.unwrap_err().is_rejection());
        assert!(cache
            .inner
            .get(&keys::rotation_lock_key(&r1))
            .await
            .unwrap()
            .is_none());

        // Cache recovers: the same token still rotates
        cache.fail_writes_with_prefix(None);
        let rotated = service.refresh(&r1, &client()).await.unwrap();
        assert_ne!(rotated.tokens.refresh_token, r1);
        let index = service.sessions().get_session_index(USER_ID).await.unwrap().unwrap();
        assert_eq!(index.active_refresh_token, rotated.tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_cache_outage_during_refresh_is_internal() {
        let cache = Arc::new(FlakyCache::new(None, true));
        let service = service_over(cache, directory().await, false);

        assert!(matches!(
            service.refresh("any-token", &client()).await,
            Err(AuthError::Cache(CacheError::Timeout { .. }))
        ));
    }

    // =========================================================================
    // Login and logout
    // =========================================================================
    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_alike() {
        let (service, cache, _) = setup(false).await;

        let wrong = service.login("a@x.com", "nope", &client()).await;
        let unknown = service.login("b@x.com", "correct", &client()).await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_logout_removes_session_and_is_idempotent() {
        let (service, cache, _) = setup(false).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let user = service.authenticate(&login.tokens.access_token).await.unwrap();

        assert_eq!(service.logout(&user).await.unwrap(), 3);
        assert!(cache.is_empty().await);
        assert!(matches!(
            service.refresh(&login.tokens.refresh_token, &client()).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert_eq!(service.logout(&user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logout_with_superseded_access_token_keeps_new_session() {
        let (service, _, _) = setup(false).await;
        let login = service.login("a@x.com", "correct", &client()).await.unwrap();
        let old_user = service.authenticate(&login.tokens.access_token).await.unwrap();
        let rotated = service
            .refresh(&login.tokens.refresh_token, &client())
            .await
            .unwrap();

        assert_eq!(service.logout(&old_user).await.unwrap(), 1);
        assert!(service.authenticate(&rotated.tokens.access_token).await.is_ok());
        assert!(service
            .refresh(&rotated.tokens.refresh_token, &client())
            .await
            .is_ok());
    }
}
