use std::sync::LazyLock;

use axum::Json;
use axum::extract::State;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::extractor::Session;
use crate::auth::password;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::messages::MessageKey;
use crate::models::User;
use crate::state::SharedState;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub reset_token: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

pub async fn login(
    State(state): State<SharedState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .users
        .find_by_email(&req.email)
        .await?
        .ok_or(AppError::Forbidden(MessageKey::CredentialsInvalid))?;

    let valid = password::verify(&req.password, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        return Err(AppError::Forbidden(MessageKey::CredentialsInvalid));
    }

    let token = state.tokens.issue(user.id).await?;
    tracing::info!("User {} logged in", user.id);

    Ok(Json(LoginResponse { token }))
}

/// Logging out an unknown or already revoked token still succeeds.
pub async fn logout(
    State(state): State<SharedState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<MessageResponse>, AppError> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        state.tokens.revoke(bearer.token()).await?;
    }
    Ok(message("Logged out successfully"))
}

pub async fn me(session: Session) -> Json<User> {
    Json(session.user)
}

pub async fn forgot_password(
    State(state): State<SharedState>,
    AppJson(req): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = req.email.as_deref().map(str::trim).unwrap_or_default();
    if !EMAIL_RE.is_match(email) {
        return Err(AppError::Validation(MessageKey::EmailInvalid));
    }

    state.resets.request_reset(email).await?;

    Ok(message("A password reset link has been sent."))
}

pub async fn reset_password(
    State(state): State<SharedState>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    // A missing token is just another invalid token.
    let reset_token = req
        .reset_token
        .ok_or(AppError::Forbidden(MessageKey::ResetTokenInvalid))?;

    state
        .resets
        .validate_and_consume(&reset_token, req.new_password.as_deref())
        .await?;

    Ok(message("Password reset successfully"))
}
