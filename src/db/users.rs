use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;

pub async fn create(pool: &PgPool, user: &User) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, password_hash, name, reset_token_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.name)
    .bind(&user.reset_token_hash)
    .bind(user.created_at)
    .fetch_one(pool)
    .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_reset_token(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE reset_token_hash = $1")
        .bind(token_hash)
        .fetch_optional(pool)
        .await
}

/// Single-row update; Postgres row locking serializes concurrent writers and
/// the last one to commit wins.
pub async fn set_reset_token(
    pool: &PgPool,
    id: Uuid,
    token_hash: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET reset_token_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Swap the password hash and clear the reset token in one statement, but only
/// if the token still matches.
pub async fn complete_reset(
    pool: &PgPool,
    token_hash: &str,
    password_hash: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET password_hash = $2, reset_token_hash = NULL
         WHERE reset_token_hash = $1
         RETURNING *",
    )
    .bind(token_hash)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
}
