//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to
//! prevent log leaks.

use crate::error::{Error, Result};
use chrono::FixedOffset;
use secrecy::SecretString;

/// Queue used when `DEFERQ_QUEUE` is unset.
pub const DEFAULT_QUEUE: &str = "deferq";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// pgmq queue jobs are delivered through.
    pub queue_name: String,
    /// Offset bounding `daily` throttle windows. `None` means process local.
    pub day_offset: Option<FixedOffset>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let day_offset = match std::env::var("DEFERQ_DAY_OFFSET") {
            Ok(raw) => Some(raw.trim().parse::<FixedOffset>().map_err(|e| {
                Error::Config(format!("DEFERQ_DAY_OFFSET must look like +02:00, got {raw:?}: {e}"))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            queue_name: std::env::var("DEFERQ_QUEUE").unwrap_or_else(|_| DEFAULT_QUEUE.to_string()),
            day_offset,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
