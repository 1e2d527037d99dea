//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8000
/// - `RATE_LIMIT_PER_MINUTE` / `RATE_LIMIT_PER_HOUR` / `RATE_LIMIT_PER_DAY`
///   (optional): per-window request quotas, defaults 10 / 200 / 500
/// - `MAX_CONCURRENT_REQUESTS` (optional): global in-flight request cap,
///   defaults to 5
/// - `LEDGER_RETENTION_DAYS` (optional): how long usage events are kept
///   before pruning, defaults to 7
/// - `RATE_LIMIT_FAIL_OPEN` (optional): whether requests are admitted when
///   the usage ledger is unreachable, defaults to false (fail closed)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_per_minute")]
    pub rate_limit_per_minute: i64,

    #[serde(default = "default_per_hour")]
    pub rate_limit_per_hour: i64,

    #[serde(default = "default_per_day")]
    pub rate_limit_per_day: i64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_retention_days")]
    pub ledger_retention_days: u64,

    #[serde(default)]
    pub rate_limit_fail_open: bool,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8000
}

fn default_per_minute() -> i64 {
    10
}

fn default_per_hour() -> i64 {
    200
}

fn default_per_day() -> i64 {
    500
}

fn default_max_concurrent() -> usize {
    5
}

fn default_retention_days() -> u64 {
    7
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Retention horizon for the usage-event ledger.
    ///
    /// Events older than `now - retention()` are eligible for pruning.
    /// Startup validation guarantees this horizon covers the largest
    /// rate-limit window, otherwise pruning would delete events the
    /// sliding-window counts still need.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.ledger_retention_days * 86_400)
    }
}
