use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SessionToken;

pub async fn create(pool: &PgPool, token: &SessionToken) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO session_tokens (token_hash, user_id, last_used_at, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&token.token_hash)
    .bind(token.user_id)
    .bind(token.last_used_at)
    .bind(token.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<SessionToken>, sqlx::Error> {
    sqlx::query_as::<_, SessionToken>("SELECT * FROM session_tokens WHERE token_hash = $1")
        .bind(token_hash)
        .fetch_optional(pool)
        .await
}

/// Advance `last_used_at` only while the token is still fresh. `GREATEST` keeps
/// the timestamp from moving backwards when touches race.
pub async fn touch_if_fresh(
    pool: &PgPool,
    token_hash: &str,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<Option<SessionToken>, sqlx::Error> {
    sqlx::query_as::<_, SessionToken>(
        "UPDATE session_tokens SET last_used_at = GREATEST(last_used_at, $2)
         WHERE token_hash = $1 AND last_used_at >= $3
         RETURNING *",
    )
    .bind(token_hash)
    .bind(now)
    .bind(cutoff)
    .fetch_optional(pool)
    .await
}

pub async fn delete_if_stale(
    pool: &PgPool,
    token_hash: &str,
    cutoff: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM session_tokens WHERE token_hash = $1 AND last_used_at < $2")
            .bind(token_hash)
            .bind(cutoff)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_by_hash(pool: &PgPool, token_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM session_tokens WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM session_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_idle_since(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM session_tokens WHERE last_used_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
