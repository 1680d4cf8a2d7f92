use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use crate::error::AppError;
use crate::messages::MessageKey;
use crate::models::User;
use crate::state::SharedState;

/// The authenticated principal for one request: the presented bearer token
/// and the user who owns it.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl FromRequestParts<SharedState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Forbidden(MessageKey::SessionInvalid))?;

        let token = bearer.token().to_string();
        let user_id = state.tokens.validate(&token).await?;

        let user = state
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Forbidden(MessageKey::SessionInvalid))?;

        Ok(Session { token, user })
    }
}
