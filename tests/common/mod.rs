use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use keyward::auth::password;
use keyward::clock::ManualClock;
use keyward::config::{Config, StorageMode};
use keyward::email::{EmailDispatcher, Template, templates};
use keyward::models::User;
use keyward::state::SharedState;
use keyward::store::{MemoryStore, PgStore, TokenStore, UserRepository};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

/// Captures rendered outgoing mail; can be switched to fail like a dead SMTP relay.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub html: String,
}

impl Outbox {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// The reset code from the most recent message.
    pub fn last_reset_token(&self) -> String {
        let mail = self.sent().pop().expect("no mail sent");
        let start = mail.html.find("<code>").expect("no reset code") + "<code>".len();
        let end = mail.html.find("</code>").unwrap();
        mail.html[start..end].to_string()
    }
}

#[async_trait]
impl EmailDispatcher for Outbox {
    async fn send(&self, to: &str, template: &Template) -> Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("550 relay unavailable".to_string());
        }
        let rendered = templates::render(to, template);
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            html: rendered.html,
        });
        Ok(())
    }
}

/// The full router over a store, a manual clock and a capturing outbox.
pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub tokens: Arc<dyn TokenStore>,
    pub users: Arc<dyn UserRepository>,
    pub clock: Arc<ManualClock>,
    pub outbox: Arc<Outbox>,
    pub database: Option<TestDatabase>,
}

/// A dedicated Postgres database created for one test.
pub struct TestDatabase {
    pub pool: PgPool,
    pub name: String,
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (Value, StatusCode) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Send a JSON request with a raw, possibly malformed, body.
    #[allow(dead_code)]
    pub async fn post_raw(&self, path: &str, raw: &str) -> (Value, StatusCode) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (Value, StatusCode) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(json!(null));
        (body, status)
    }

    pub async fn seed_user(&self, email: &str, password: &str) -> User {
        let hash = password::hash(password).unwrap();
        self.users
            .insert(&User::new(email, &hash, "Test User"))
            .await
            .expect("seed user")
    }

    pub async fn user(&self, email: &str) -> User {
        self.users.find_by_email(email).await.unwrap().expect("user exists")
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        self.request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Seed a user and log in, returning the bearer token.
    pub async fn session(&self, email: &str, password: &str) -> String {
        self.seed_user(email, password).await;
        let (body, status) = self.login(email, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn me(&self, token: &str) -> (Value, StatusCode) {
        self.request(Method::GET, "/api/v1/auth/me", Some(token), None).await
    }

    pub async fn forgot_password(&self, email: &str) -> (Value, StatusCode) {
        self.request(
            Method::POST,
            "/api/v1/auth/forgot-password",
            None,
            Some(json!({ "email": email })),
        )
        .await
    }

    pub async fn reset_password(&self, token: &str, new_password: Option<&str>) -> (Value, StatusCode) {
        self.request(
            Method::POST,
            "/api/v1/auth/reset-password",
            None,
            Some(json!({ "resetToken": token, "newPassword": new_password })),
        )
        .await
    }
}

fn assemble(
    config: Config,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserRepository>,
    database: Option<TestDatabase>,
) -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let outbox = Arc::new(Outbox::default());

    let state = keyward::build_state(
        config,
        users.clone(),
        tokens.clone(),
        outbox.clone(),
        clock.clone(),
    );
    let router = keyward::build_app(state.clone());

    TestApp {
        router,
        state,
        tokens,
        users,
        clock,
        outbox,
        database,
    }
}

/// App over a fresh in-memory store.
#[allow(dead_code)]
pub fn spawn_app() -> TestApp {
    spawn_app_with(Config::in_memory())
}

#[allow(dead_code)]
pub fn spawn_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    assemble(config, store.clone(), store, None)
}

fn admin_url(base_url: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.to_string())
}

/// App over a dedicated, freshly migrated Postgres database. Returns `None`
/// (and the test passes trivially) when `DATABASE_URL` is not set.
#[allow(dead_code)]
pub async fn spawn_pg_app() -> Option<TestApp> {
    let _ = dotenvy::dotenv();

    let Ok(base_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let db_name = format!("keyward_test_{}", Uuid::now_v7().to_string().replace('-', ""));

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let config = Config {
        storage: StorageMode::Postgres,
        database_url: Some(test_url),
        ..Config::in_memory()
    };
    let store = Arc::new(PgStore::new(pool.clone()));

    Some(assemble(
        config,
        store.clone(),
        store,
        Some(TestDatabase { pool, name: db_name }),
    ))
}

/// Drop the test database, if the app had one.
#[allow(dead_code)]
pub async fn cleanup(app: TestApp) {
    let Some(database) = app.database else {
        return;
    };
    database.pool.close().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", database.name))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
