pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod email;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::config::Config;
use crate::email::{EmailDispatcher, LogDispatcher, SmtpDispatcher};
use crate::models::User;
use crate::services::{CleanupScheduler, PasswordResetService, TokenService};
use crate::state::{AppState, SharedState};
use crate::store::{StoreError, TokenStore, UserRepository};

/// Wire the services together over the given storage, mailer and clock.
pub fn build_state(
    config: Config,
    users: Arc<dyn UserRepository>,
    token_store: Arc<dyn TokenStore>,
    mailer: Arc<dyn EmailDispatcher>,
    clock: Arc<dyn Clock>,
) -> SharedState {
    let tokens = TokenService::new(
        token_store,
        clock,
        chrono::Duration::try_days(config.session_idle_days).unwrap_or(chrono::Duration::MAX),
    );
    let resets = PasswordResetService::new(
        users.clone(),
        tokens.clone(),
        mailer,
        config.base_url.trim_end_matches('/').to_string(),
    );

    Arc::new(AppState {
        config,
        users,
        tokens,
        resets,
    })
}

/// SMTP when configured, otherwise mail goes to the log.
pub fn mailer_from_config(config: &Config) -> Arc<dyn EmailDispatcher> {
    match config.smtp.as_ref().map(SmtpDispatcher::new) {
        Some(Ok(mailer)) => {
            tracing::info!("SMTP configured");
            Arc::new(mailer)
        }
        Some(Err(e)) => {
            tracing::warn!("SMTP not available, logging emails instead: {e}");
            Arc::new(LogDispatcher)
        }
        None => {
            tracing::warn!("SMTP not configured, logging emails instead");
            Arc::new(LogDispatcher)
        }
    }
}

pub fn build_scheduler(state: &SharedState) -> CleanupScheduler {
    CleanupScheduler::new(
        state.tokens.clone(),
        Duration::from_secs(state.config.cleanup_interval_secs),
    )
}

/// Create the configured bootstrap account unless that email is already taken.
/// A password that the reset policy would refuse is a startup error.
pub async fn bootstrap_admin(state: &SharedState) -> Result<(), String> {
    let Some(admin) = state.config.admin.as_ref() else {
        return Ok(());
    };

    auth::password::check_policy(Some(&admin.password)).map_err(|key| {
        format!("KEYWARD_ADMIN_PASSWORD rejected: {}", key.text())
    })?;

    if state
        .users
        .find_by_email(&admin.email)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Ok(());
    }

    let pw_hash = auth::password::hash(&admin.password)?;
    match state
        .users
        .insert(&User::new(&admin.email, &pw_hash, "Administrator"))
        .await
    {
        Ok(user) => {
            tracing::info!("Created bootstrap account {} ({})", user.email, user.id);
            Ok(())
        }
        // Another instance won the race.
        Err(StoreError::Duplicate(_)) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn build_app(state: SharedState) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(axum::middleware::from_fn(middleware::envelope::error_envelope))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
