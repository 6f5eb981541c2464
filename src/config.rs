use std::{str::FromStr, time::Duration};

use anyhow::Context;

use crate::realtime::HubConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub outbound_queue_capacity: usize,
    pub typing_timeout: Duration,
    pub edit_window: Duration,
    pub session_idle: time::Duration,
    pub cors_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            db_max_connections: 16,
            outbound_queue_capacity: 64,
            typing_timeout: Duration::from_millis(3000),
            edit_window: Duration::from_secs(300),
            session_idle: time::Duration::minutes(60),
            cors_origin: None,
        }
    }
}

impl Config {
    /// Loads `.env` (if any) and then reads the process environment,
    /// falling back to the defaults for unset keys.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        Ok(Config {
            database_url: dotenv::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            outbound_queue_capacity: parse_var("OUTBOUND_QUEUE_CAPACITY")?
                .unwrap_or(defaults.outbound_queue_capacity),
            typing_timeout: parse_var("TYPING_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.typing_timeout),
            edit_window: parse_var("EDIT_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.edit_window),
            session_idle: parse_var("SESSION_IDLE_MINUTES")?
                .map(time::Duration::minutes)
                .unwrap_or(defaults.session_idle),
            cors_origin: dotenv::var("CORS_ORIGIN").ok(),
        })
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_capacity: self.outbound_queue_capacity,
            typing_timeout: self.typing_timeout,
        }
    }
}

fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(None),
    }
}
