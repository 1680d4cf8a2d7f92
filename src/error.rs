use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::messages::MessageKey;
use crate::services::password_reset::ResetError;
use crate::services::tokens::TokenError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    NotFound(MessageKey),
    Forbidden(MessageKey),
    Validation(MessageKey),
    Delivery(MessageKey),
    Internal(String),
    Storage(StoreError),
}

/// Attached to every error response so the envelope middleware can render it
/// with the request path.
#[derive(Debug, Clone, Copy)]
pub struct ErrorMessage(pub MessageKey);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(key) => write!(f, "Not Found: {key}"),
            AppError::Forbidden(key) => write!(f, "Forbidden: {key}"),
            AppError::Validation(key) => write!(f, "Validation Error: {key}"),
            AppError::Delivery(key) => write!(f, "Delivery Error: {key}"),
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Storage(err) => write!(f, "Storage Error: {err}"),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Delivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message_key(&self) -> MessageKey {
        match self {
            AppError::NotFound(key)
            | AppError::Forbidden(key)
            | AppError::Validation(key)
            | AppError::Delivery(key) => *key,
            AppError::Internal(_) | AppError::Storage(_) => MessageKey::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(msg) => tracing::error!("Internal error: {msg}"),
            AppError::Storage(err) => tracing::error!("Storage error: {err}"),
            _ => {}
        }

        let key = self.message_key();
        let body = json!({ "message": key.text() });
        let mut response = (self.status(), axum::Json(body)).into_response();
        response.extensions_mut().insert(ErrorMessage(key));
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AppError::Validation(MessageKey::RequestInvalid)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Storage(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Unauthorized => AppError::Forbidden(MessageKey::SessionInvalid),
            TokenError::Storage(err) => AppError::Storage(err),
        }
    }
}

impl From<ResetError> for AppError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::NotFound => AppError::NotFound(MessageKey::UserNotFound),
            ResetError::Forbidden => AppError::Forbidden(MessageKey::ResetTokenInvalid),
            ResetError::Validation(key) => AppError::Validation(key),
            ResetError::Delivery(msg) => {
                tracing::warn!("Password reset email failed: {msg}");
                AppError::Delivery(MessageKey::EmailDeliveryFailed)
            }
            ResetError::Storage(err) => AppError::Storage(err),
            ResetError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
