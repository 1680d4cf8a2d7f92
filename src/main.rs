use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use keyward::clock::SystemClock;
use keyward::config::{Config, StorageMode};
use keyward::store::{MemoryStore, PgStore, TokenStore, UserRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting Keyward");

    let (users, tokens): (Arc<dyn UserRepository>, Arc<dyn TokenStore>) = match config.storage {
        StorageMode::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required for postgres storage")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied");

            let store = Arc::new(PgStore::new(pool));
            (store.clone() as Arc<dyn UserRepository>, store as Arc<dyn TokenStore>)
        }
        StorageMode::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on exit");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn UserRepository>, store as Arc<dyn TokenStore>)
        }
    };

    let mailer = keyward::mailer_from_config(&config);
    let addr = SocketAddr::new(config.host, config.port);
    let state = keyward::build_state(config, users, tokens, mailer, Arc::new(SystemClock));

    keyward::bootstrap_admin(&state).await?;

    let scheduler = keyward::build_scheduler(&state);
    scheduler.start();

    let app = keyward::build_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
