use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One active session. The bearer value itself is never stored, only its digest.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionToken {
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: Uuid,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(token_hash: String, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            token_hash,
            user_id,
            last_used_at: now,
            created_at: now,
        }
    }
}
