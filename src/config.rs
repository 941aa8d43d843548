use std::{str::FromStr, time::Duration};

use anyhow::Context;

/// Runtime settings, read from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Busy timeout for SQLite and acquire timeout for the pool.
    pub db_timeout: Duration,
    pub session_idle: time::Duration,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite://chat.db"),
            bind_addr: var("BIND_ADDR", "0.0.0.0"),
            port: parse(&lookup, "PORT", 5000)?,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 16)?,
            db_timeout: Duration::from_secs(parse(&lookup, "DB_TIMEOUT_SECS", 5)?),
            session_idle: time::Duration::minutes(parse(&lookup, "SESSION_IDLE_MINS", 60)?),
            cookie_secure: parse(&lookup, "COOKIE_SECURE", false)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
