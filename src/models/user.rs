use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    /// Digest of the outstanding single-use reset token, if any.
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, password_hash: &str, name: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            reset_token_hash: None,
            created_at: Utc::now(),
        }
    }
}
