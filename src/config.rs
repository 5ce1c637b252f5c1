//! Worker/master process settings (spec §6 "Environment variables").
//!
//! Follows the teacher's `main.rs` startup shape: `dotenv::dotenv().ok()`
//! then required env vars pulled with `env::var`, just expanded to the full
//! set of cache/DB parameters a complete service needs.

use std::env;

/// Process-wide settings, parsed once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Required for worker processes; uniquely names the worker in the
    /// registry. Absent for the master.
    pub worker_id: Option<String>,
    pub bot_token: String,
    pub redis_url: String,
    pub database_url: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// An error loading [`Settings`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

impl Settings {
    /// Loads settings for a worker process. Requires `WORKER_ID`.
    pub fn load_worker() -> Result<Settings, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Settings {
            worker_id: Some(require("WORKER_ID")?),
            bot_token: require("BOT_TOKEN")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            database_url: require("DATABASE_URL")?,
            log_format: log_format(),
        })
    }

    /// Loads settings for the master process. Does not require `WORKER_ID`.
    pub fn load_master() -> Result<Settings, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Settings {
            worker_id: None,
            bot_token: require("BOT_TOKEN")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            database_url: require("DATABASE_URL")?,
            log_format: log_format(),
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn log_format() -> LogFormat {
    match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

/// Initializes the global `tracing` subscriber according to `RUST_LOG` and
/// [`Settings::log_format`].
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}
