use std::sync::Arc;

use crate::auth::password;
use crate::crypto;
use crate::email::{EmailDispatcher, Template};
use crate::messages::MessageKey;
use crate::store::{StoreError, UserRepository};

use super::tokens::TokenService;

#[derive(Debug)]
pub enum ResetError {
    NotFound,
    /// Unknown, superseded or already consumed reset token.
    Forbidden,
    Validation(MessageKey),
    Delivery(String),
    Storage(StoreError),
    Internal(String),
}

impl std::fmt::Display for ResetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetError::NotFound => write!(f, "No user with that email"),
            ResetError::Forbidden => write!(f, "Invalid reset token"),
            ResetError::Validation(key) => write!(f, "Validation failed: {key}"),
            ResetError::Delivery(msg) => write!(f, "Delivery failed: {msg}"),
            ResetError::Storage(err) => write!(f, "{err}"),
            ResetError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<StoreError> for ResetError {
    fn from(err: StoreError) -> Self {
        ResetError::Storage(err)
    }
}

/// Issues single-use reset tokens, mails them, and consumes them on password change.
pub struct PasswordResetService {
    users: Arc<dyn UserRepository>,
    tokens: TokenService,
    mailer: Arc<dyn EmailDispatcher>,
    base_url: String,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: TokenService,
        mailer: Arc<dyn EmailDispatcher>,
        base_url: String,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            base_url,
        }
    }

    /// Store a fresh reset token on the user (replacing any previous one) and
    /// mail it. The token stays stored even if the mail cannot be delivered;
    /// asking again simply replaces it.
    pub async fn request_reset(&self, email: &str) -> Result<(), ResetError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ResetError::NotFound)?;

        let token = crypto::generate_token();
        self.users
            .set_reset_token(user.id, &crypto::digest(&token))
            .await?;

        let reset_url = format!("{}/auth/reset-password?token={token}", self.base_url);
        self.mailer
            .send(&user.email, &Template::PasswordReset { token, reset_url })
            .await
            .map_err(ResetError::Delivery)?;

        tracing::info!("Password reset requested for user {}", user.id);
        Ok(())
    }

    /// Set a new password using a reset token. The token is checked before the
    /// password is looked at; a policy failure leaves the token usable.
    pub async fn validate_and_consume(
        &self,
        token: &str,
        new_password: Option<&str>,
    ) -> Result<(), ResetError> {
        let token_hash = crypto::digest(token);
        if self.users.find_by_reset_token(&token_hash).await?.is_none() {
            return Err(ResetError::Forbidden);
        }

        let new_password = password::check_policy(new_password).map_err(ResetError::Validation)?;
        let pw_hash = password::hash(new_password).map_err(ResetError::Internal)?;

        // Conditional on the token still matching: a concurrent consume or a
        // newer reset request makes this a no-op.
        let user = self
            .users
            .complete_reset(&token_hash, &pw_hash)
            .await?
            .ok_or(ResetError::Forbidden)?;

        match self.tokens.revoke_all_for_user(user.id).await {
            Ok(count) => tracing::info!(
                "Password reset completed for user {}, {count} sessions revoked",
                user.id
            ),
            Err(e) => tracing::error!(
                "Password reset completed for user {} but revoking sessions failed: {e}",
                user.id
            ),
        }
        Ok(())
    }
}
