use std::net::IpAddr;

use crate::services::cleanup::DEFAULT_CLEANUP_INTERVAL;
use crate::services::tokens::DEFAULT_IDLE_TIMEOUT_DAYS;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageMode,
    pub database_url: Option<String>,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub log_level: String,
    pub session_idle_days: i64,
    pub cleanup_interval_secs: u64,
    pub smtp: Option<SmtpConfig>,
    pub admin: Option<AdminAccount>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

/// Account created at startup when no user with this email exists yet.
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageMode {
    Postgres,
    Memory,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let storage = match env_or("KEYWARD_STORAGE", "postgres").as_str() {
            "postgres" => StorageMode::Postgres,
            "memory" => StorageMode::Memory,
            other => return Err(format!("Invalid KEYWARD_STORAGE: {other}")),
        };

        let database_url = match storage {
            StorageMode::Postgres => Some(env_required("DATABASE_URL")?),
            StorageMode::Memory => std::env::var("DATABASE_URL").ok(),
        };

        let host: IpAddr = env_or("KEYWARD_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid KEYWARD_HOST: {e}"))?;

        let port: u16 = env_or("KEYWARD_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid KEYWARD_PORT: {e}"))?;

        let base_url = env_or("KEYWARD_BASE_URL", &format!("http://{host}:{port}"));

        let log_level = env_or("KEYWARD_LOG_LEVEL", "info");

        let session_idle_days = parse_idle_days(&env_or("KEYWARD_SESSION_IDLE_DAYS", "7"))?;

        let cleanup_interval_secs: u64 = env_or("KEYWARD_CLEANUP_INTERVAL_SECS", "3600")
            .parse()
            .map_err(|e| format!("Invalid KEYWARD_CLEANUP_INTERVAL_SECS: {e}"))?;
        if cleanup_interval_secs == 0 {
            return Err("KEYWARD_CLEANUP_INTERVAL_SECS must be positive".to_string());
        }

        let smtp = match (
            std::env::var("KEYWARD_SMTP_HOST").ok(),
            std::env::var("KEYWARD_SMTP_PORT").ok(),
            std::env::var("KEYWARD_SMTP_USER").ok(),
            std::env::var("KEYWARD_SMTP_PASS").ok(),
            std::env::var("KEYWARD_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid KEYWARD_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        let admin = match (
            std::env::var("KEYWARD_ADMIN_EMAIL").ok(),
            std::env::var("KEYWARD_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(AdminAccount { email, password }),
            _ => None,
        };

        Ok(Config {
            storage,
            database_url,
            host,
            port,
            base_url,
            log_level,
            session_idle_days,
            cleanup_interval_secs,
            smtp,
            admin,
        })
    }

    /// Defaults suitable for tests and local experiments: in-memory storage,
    /// no SMTP, no bootstrap account.
    pub fn in_memory() -> Self {
        Config {
            storage: StorageMode::Memory,
            database_url: None,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            base_url: "http://localhost:3000".to_string(),
            log_level: "warn".to_string(),
            session_idle_days: DEFAULT_IDLE_TIMEOUT_DAYS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            smtp: None,
            admin: None,
        }
    }
}

pub const MAX_SESSION_IDLE_DAYS: i64 = 3650;

fn parse_idle_days(raw: &str) -> Result<i64, String> {
    let days: i64 = raw
        .parse()
        .map_err(|e| format!("Invalid KEYWARD_SESSION_IDLE_DAYS: {e}"))?;
    if !(1..=MAX_SESSION_IDLE_DAYS).contains(&days) {
        return Err(format!(
            "KEYWARD_SESSION_IDLE_DAYS must be between 1 and {MAX_SESSION_IDLE_DAYS}"
        ));
    }
    Ok(days)
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_days_accepts_the_supported_range() {
        assert_eq!(parse_idle_days("7"), Ok(7));
        assert_eq!(parse_idle_days("1"), Ok(1));
        assert_eq!(parse_idle_days("3650"), Ok(MAX_SESSION_IDLE_DAYS));
    }

    #[test]
    fn idle_days_rejects_values_outside_the_range() {
        for raw in ["0", "-3", "3651", "1000000000", "seven"] {
            assert!(parse_idle_days(raw).is_err(), "{raw}");
        }
    }
}
