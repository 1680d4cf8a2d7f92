use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{StoreError, TokenStore, UserRepository};
use crate::models::{SessionToken, User};

/// Process-local store. Every mutation of a token or user happens under that
/// entry's shard lock, so per-token and per-user writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tokens: DashMap<String, SessionToken>,
    users: DashMap<Uuid, User>,
    /// lowercased email -> user id
    emails: DashMap<String, Uuid>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn user_id_for_reset_token(&self, token_hash: &str) -> Option<Uuid> {
        self.users
            .iter()
            .find(|u| u.reset_token_hash.as_deref() == Some(token_hash))
            .map(|u| u.id)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(&self, token: &SessionToken) -> Result<(), StoreError> {
        self.check()?;
        match self.tokens.entry(token.token_hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("session token".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionToken>, StoreError> {
        self.check()?;
        Ok(self.tokens.get(token_hash).map(|t| t.value().clone()))
    }

    async fn touch(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionToken>, StoreError> {
        self.check()?;
        let Some(mut token) = self.tokens.get_mut(token_hash) else {
            return Ok(None);
        };
        if token.last_used_at < cutoff {
            return Ok(None);
        }
        if now > token.last_used_at {
            token.last_used_at = now;
        }
        Ok(Some(token.clone()))
    }

    async fn delete_stale(
        &self,
        token_hash: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self
            .tokens
            .remove_if(token_hash, |_, t| t.last_used_at < cutoff)
            .is_some())
    }

    async fn delete(&self, token_hash: &str) -> Result<(), StoreError> {
        self.check()?;
        self.tokens.remove(token_hash);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.check()?;
        let before = self.tokens.len();
        self.tokens.retain(|_, t| t.user_id != user_id);
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check()?;
        let mut removed = 0u64;
        self.tokens.retain(|_, t| {
            let keep = t.last_used_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        self.check()?;
        match self.emails.entry(user.email.to_lowercase()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("user {}", user.email))),
            Entry::Vacant(slot) => {
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user.clone())
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check()?;
        let Some(id) = self.emails.get(&email.to_lowercase()).map(|id| *id.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self
            .user_id_for_reset_token(token_hash)
            .and_then(|id| self.users.get(&id).map(|u| u.value().clone())))
    }

    async fn set_reset_token(&self, user_id: Uuid, token_hash: &str) -> Result<(), StoreError> {
        self.check()?;
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.reset_token_hash = Some(token_hash.to_string());
        }
        Ok(())
    }

    async fn complete_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        self.check()?;
        let Some(id) = self.user_id_for_reset_token(token_hash) else {
            return Ok(None);
        };
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(None);
        };
        // Re-check under the entry lock: another request may have consumed or
        // replaced the token since the scan.
        if user.reset_token_hash.as_deref() != Some(token_hash) {
            return Ok(None);
        }
        user.password_hash = password_hash.to_string();
        user.reset_token_hash = None;
        Ok(Some(user.clone()))
    }
}
