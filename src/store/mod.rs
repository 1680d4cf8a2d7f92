pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{SessionToken, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Unavailable(String),
    Duplicate(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "Database error: {err}"),
            StoreError::Unavailable(msg) => write!(f, "Storage unavailable: {msg}"),
            StoreError::Duplicate(what) => write!(f, "Duplicate {what}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Persistence for session tokens, keyed by token digest.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, token: &SessionToken) -> Result<(), StoreError>;

    async fn find(&self, token_hash: &str) -> Result<Option<SessionToken>, StoreError>;

    /// Atomically set `last_used_at = max(last_used_at, now)` if the token was
    /// used at or after `cutoff`. Returns the touched token, or `None` when the
    /// token is missing or stale.
    async fn touch(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionToken>, StoreError>;

    /// Delete a single token only if it is still older than `cutoff`.
    async fn delete_stale(&self, token_hash: &str, cutoff: DateTime<Utc>)
    -> Result<bool, StoreError>;

    async fn delete(&self, token_hash: &str) -> Result<(), StoreError>;

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Bulk eviction of every token last used before `cutoff`.
    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// The slice of user persistence the auth core needs.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError>;

    /// Overwrite the user's reset token. Concurrent writers are serialized and
    /// the last write wins.
    async fn set_reset_token(&self, user_id: Uuid, token_hash: &str) -> Result<(), StoreError>;

    /// Replace the password hash and clear the reset token in one write, if the
    /// given token is still the one on record.
    async fn complete_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
}
