use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, TokenStore, UserRepository};
use crate::db;
use crate::models::{SessionToken, User};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn create(&self, token: &SessionToken) -> Result<(), StoreError> {
        Ok(db::tokens::create(&self.pool, token).await?)
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionToken>, StoreError> {
        Ok(db::tokens::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn touch(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionToken>, StoreError> {
        Ok(db::tokens::touch_if_fresh(&self.pool, token_hash, now, cutoff).await?)
    }

    async fn delete_stale(
        &self,
        token_hash: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(db::tokens::delete_if_stale(&self.pool, token_hash, cutoff).await?)
    }

    async fn delete(&self, token_hash: &str) -> Result<(), StoreError> {
        Ok(db::tokens::delete_by_hash(&self.pool, token_hash).await?)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        Ok(db::tokens::delete_all_for_user(&self.pool, user_id).await?)
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(db::tokens::delete_idle_since(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        Ok(db::users::create(&self.pool, user).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(db::users::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(db::users::find_by_email(&self.pool, email).await?)
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        Ok(db::users::find_by_reset_token(&self.pool, token_hash).await?)
    }

    async fn set_reset_token(&self, user_id: Uuid, token_hash: &str) -> Result<(), StoreError> {
        if !db::users::set_reset_token(&self.pool, user_id, token_hash).await? {
            tracing::warn!("Reset token not stored: user {user_id} no longer exists");
        }
        Ok(())
    }

    async fn complete_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(db::users::complete_reset(&self.pool, token_hash, password_hash).await?)
    }
}
