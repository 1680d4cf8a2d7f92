use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::crypto;
use crate::models::SessionToken;
use crate::store::{StoreError, TokenStore};

/// Sessions idle for longer than this are dead.
pub const DEFAULT_IDLE_TIMEOUT_DAYS: i64 = 7;

#[derive(Debug)]
pub enum TokenError {
    /// Unknown, revoked and expired tokens all look the same to callers.
    Unauthorized,
    Storage(StoreError),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Unauthorized => write!(f, "Unauthorized"),
            TokenError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl From<StoreError> for TokenError {
    fn from(err: StoreError) -> Self {
        TokenError::Storage(err)
    }
}

/// Issues, validates and revokes opaque bearer tokens with sliding expiration.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, idle_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            idle_timeout,
        }
    }

    /// Oldest `last_used_at` still considered fresh at `now`. Saturates at the
    /// earliest representable instant for very long timeouts.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.idle_timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Create a session for `user_id` and return the bearer value. Only its
    /// digest is persisted.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        loop {
            let value = crypto::generate_token();
            let token = SessionToken::new(crypto::digest(&value), user_id, self.clock.now());
            match self.store.create(&token).await {
                Ok(()) => {
                    tracing::debug!("Issued session token for user {user_id}");
                    return Ok(value);
                }
                // 256 random bits; a collision means the RNG is broken, but retrying is harmless.
                Err(StoreError::Duplicate(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resolve a bearer value to its owner and slide its expiry forward.
    pub async fn validate(&self, value: &str) -> Result<Uuid, TokenError> {
        let token_hash = crypto::digest(value);
        let now = self.clock.now();
        let cutoff = self.cutoff(now);

        if let Some(token) = self.store.touch(&token_hash, now, cutoff).await? {
            return Ok(token.user_id);
        }

        if self.store.delete_stale(&token_hash, cutoff).await? {
            tracing::debug!("Deleted expired session token on access");
        }
        Err(TokenError::Unauthorized)
    }

    /// Logout. Revoking an unknown token is not an error.
    pub async fn revoke(&self, value: &str) -> Result<(), TokenError> {
        self.store.delete(&crypto::digest(value)).await?;
        Ok(())
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, TokenError> {
        Ok(self.store.delete_for_user(user_id).await?)
    }

    /// Bulk-delete every token idle past the timeout as of now.
    pub async fn evict_idle(&self) -> Result<u64, TokenError> {
        let cutoff = self.cutoff(self.clock.now());
        Ok(self.store.delete_idle_since(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn service() -> (TokenService, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = TokenService::new(
            store.clone(),
            clock.clone(),
            Duration::days(DEFAULT_IDLE_TIMEOUT_DAYS),
        );
        (service, store, clock)
    }

    #[tokio::test]
    async fn fresh_token_validates_and_slides_forward() {
        let (service, store, clock) = service();
        let user_id = Uuid::now_v7();
        let value = service.issue(user_id).await.unwrap();

        clock.advance(Duration::hours(3));
        assert_eq!(service.validate(&value).await.unwrap(), user_id);

        let stored = store.find(&crypto::digest(&value)).await.unwrap().unwrap();
        assert_eq!(stored.last_used_at, clock.now());
    }

    #[tokio::test]
    async fn rapid_reuse_keeps_succeeding() {
        let (service, _, _) = service();
        let user_id = Uuid::now_v7();
        let value = service.issue(user_id).await.unwrap();

        for _ in 0..5 {
            assert_eq!(service.validate(&value).await.unwrap(), user_id);
        }
    }

    #[tokio::test]
    async fn token_used_within_window_survives() {
        let (service, _, clock) = service();
        let value = service.issue(Uuid::now_v7()).await.unwrap();

        clock.advance(Duration::days(6));
        assert!(service.validate(&value).await.is_ok());
        clock.advance(Duration::days(6));
        assert!(service.validate(&value).await.is_ok());
    }

    #[tokio::test]
    async fn exactly_at_threshold_is_still_valid() {
        let (service, _, clock) = service();
        let value = service.issue(Uuid::now_v7()).await.unwrap();

        clock.advance(Duration::days(7));
        assert!(service.validate(&value).await.is_ok());
    }

    #[tokio::test]
    async fn idle_token_is_rejected_and_deleted() {
        let (service, store, clock) = service();
        let value = service.issue(Uuid::now_v7()).await.unwrap();

        clock.advance(Duration::days(7) + Duration::milliseconds(1));
        assert!(matches!(
            service.validate(&value).await,
            Err(TokenError::Unauthorized)
        ));
        assert!(store.find(&crypto::digest(&value)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let (service, _, _) = service();
        assert!(matches!(
            service.validate("never-issued").await,
            Err(TokenError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (service, _, _) = service();
        let value = service.issue(Uuid::now_v7()).await.unwrap();

        service.revoke(&value).await.unwrap();
        service.revoke(&value).await.unwrap();
        assert!(matches!(
            service.validate(&value).await,
            Err(TokenError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn huge_idle_timeout_does_not_overflow() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = TokenService::new(store.clone(), clock, Duration::MAX);
        let value = service.issue(Uuid::now_v7()).await.unwrap();

        assert!(service.validate(&value).await.is_ok());
        assert!(matches!(
            service.validate("never-issued").await,
            Err(TokenError::Unauthorized)
        ));
        assert_eq!(service.evict_idle().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_validation_of_a_live_token_all_succeeds() {
        let (service, store, clock) = service();
        let user_id = Uuid::now_v7();
        let value = service.issue(user_id).await.unwrap();
        clock.advance(Duration::days(6));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let value = value.clone();
            handles.push(tokio::spawn(async move { service.validate(&value).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), user_id);
        }

        let stored = store.find(&crypto::digest(&value)).await.unwrap().unwrap();
        assert_eq!(stored.last_used_at, clock.now());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_validation_of_an_idle_token_never_revives_it() {
        let (service, store, clock) = service();
        let value = service.issue(Uuid::now_v7()).await.unwrap();
        clock.advance(Duration::days(8));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let value = value.clone();
            handles.push(tokio::spawn(async move { service.validate(&value).await }));
        }
        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(TokenError::Unauthorized)
            ));
        }

        assert!(store.find(&crypto::digest(&value)).await.unwrap().is_none());
        assert_eq!(store.token_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn validation_racing_eviction_stays_consistent() {
        let (service, store, clock) = service();
        let live = service.issue(Uuid::now_v7()).await.unwrap();
        clock.advance(Duration::days(5));
        let fresh = service.issue(Uuid::now_v7()).await.unwrap();
        clock.advance(Duration::days(3));
        // `live` is now idle for 8 days, `fresh` for 3.

        for _ in 0..8 {
            let evictor = {
                let service = service.clone();
                tokio::spawn(async move { service.evict_idle().await })
            };
            let idle = {
                let service = service.clone();
                let value = live.clone();
                tokio::spawn(async move { service.validate(&value).await })
            };
            let active = {
                let service = service.clone();
                let value = fresh.clone();
                tokio::spawn(async move { service.validate(&value).await })
            };

            evictor.await.unwrap().unwrap();
            assert!(matches!(idle.await.unwrap(), Err(TokenError::Unauthorized)));
            assert!(active.await.unwrap().is_ok());
        }

        assert!(store.find(&crypto::digest(&live)).await.unwrap().is_none());
        assert!(store.find(&crypto::digest(&fresh)).await.unwrap().is_some());
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn storage_failures_are_not_reported_as_unauthorized() {
        let (service, store, _) = service();
        let value = service.issue(Uuid::now_v7()).await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            service.validate(&value).await,
            Err(TokenError::Storage(_))
        ));
    }
}
