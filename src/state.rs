//! Shared application state.
//!
//! One `AppState` is built at startup and cloned into every handler and
//! middleware via axum's `State` extractor. Cloning is cheap: the pool is
//! internally reference-counted and the core components are behind `Arc`.
//!
//! The credential store and ledger are held as trait objects so the
//! request pipeline can be exercised in tests without a live Postgres.

use crate::config::Config;
use crate::db::DbPool;
use crate::services::api_keys::{CredentialStore, SqlCredentialStore};
use crate::services::gate::AdmissionGate;
use crate::services::ledger::{Ledger, SqlLedger};
use crate::services::limiter::RateLimiter;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: DbPool,

    /// Credential store resolving presented API keys
    pub credentials: Arc<dyn CredentialStore>,

    /// Global in-flight request cap
    pub gate: Arc<AdmissionGate>,

    /// Sliding-window rate limiter (static window configuration)
    pub limiter: Arc<RateLimiter>,

    /// Usage-event ledger the limiter counts against
    pub ledger: Arc<dyn Ledger>,

    /// Whether requests are admitted when the ledger is unreachable
    pub rate_limit_fail_open: bool,

    /// Retention horizon for ledger pruning
    pub ledger_retention: Duration,
}

impl AppState {
    pub fn new(pool: DbPool, config: &Config) -> Self {
        Self {
            credentials: Arc::new(SqlCredentialStore::new(pool.clone())),
            gate: AdmissionGate::new(config.max_concurrent_requests),
            limiter: Arc::new(RateLimiter::from_config(config)),
            ledger: Arc::new(SqlLedger::new(pool.clone())),
            rate_limit_fail_open: config.rate_limit_fail_open,
            ledger_retention: config.retention(),
            pool,
        }
    }
}
