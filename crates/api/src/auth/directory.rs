//! User directory: read-only lookup of users by email or id

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub country_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("user directory timed out")]
    Timeout,

    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DirectoryError>;

    async fn ping(&self) -> Result<(), DirectoryError>;
}

pub type SharedDirectory = Arc<dyn UserDirectory>;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     phone, country_id, address_line, is_active";

/// Postgres-backed directory over the `users` table
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, DirectoryError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(op = op, error = %e, "User directory query failed");
                Err(DirectoryError::Unavailable(e.to_string()))
            }
            Err(_) => {
                tracing::error!(
                    op = op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "User directory query timed out"
                );
                Err(DirectoryError::Timeout)
            }
        }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL"
        );
        self.bounded(
            "find_by_email",
            sqlx::query_as::<_, User>(&query)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DirectoryError> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        self.bounded(
            "find_by_id",
            sqlx::query_as::<_, User>(&query)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn ping(&self) -> Result<(), DirectoryError> {
        self.bounded("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
        })
        .await
    }
}

/// Directory held in memory, for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<i64, User>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn remove(&self, id: i64) -> Option<User> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DirectoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn ping(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}
