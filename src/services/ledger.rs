//! Usage-event ledger: the append-only record of admitted requests.
//!
//! Every admitted request becomes one row in `usage_events`. The sliding-
//! window limiter reads the ledger through range counts; a maintenance
//! prune deletes rows past the retention horizon. The ledger is behind a
//! trait so the limiter can be exercised in tests against an in-memory
//! implementation.

use crate::db::DbPool;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read/write contract for the request ledger.
///
/// # Consistency
///
/// `record` and `count_since` are consistent per API key through the
/// database, but two requests racing on the same key may each miss the
/// other's not-yet-committed event. That slight undercounting under
/// extreme concurrency is accepted; accuracy is best-effort, never
/// over-counting.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append one usage event.
    ///
    /// Callers on the request path must treat failure as an operator
    /// problem (log it), never as a reason to fail the already-admitted
    /// request.
    async fn record(
        &self,
        api_key_id: i64,
        endpoint: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Count events for `api_key_id` with `occurred_at >= cutoff`.
    async fn count_since(&self, api_key_id: i64, cutoff: DateTime<Utc>)
    -> Result<i64, AppError>;

    /// Earliest event timestamp for `api_key_id` at or after `cutoff`.
    ///
    /// Used to compute an exact Retry-After: the violated window clears
    /// when its oldest event ages out.
    async fn oldest_since(
        &self,
        api_key_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Delete events older than `older_than`, returning how many rows
    /// were removed.
    ///
    /// Safe to run concurrently with `record`/`count_since`. The caller
    /// is responsible for keeping `older_than` at least one full largest
    /// window in the past (validated at startup from configuration).
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Ledger backed by the `usage_events` table.
#[derive(Debug, Clone)]
pub struct SqlLedger {
    pool: DbPool,
}

impl SqlLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// Ledger faults are reported as LedgerUnavailable rather than a generic
// database error so the pipeline can apply its fail-open/fail-closed
// policy to them specifically.
#[async_trait]
impl Ledger for SqlLedger {
    async fn record(
        &self,
        api_key_id: i64,
        endpoint: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO usage_events (api_key_id, endpoint, occurred_at) VALUES ($1, $2, $3)")
            .bind(api_key_id)
            .bind(endpoint)
            .bind(occurred_at)
            .execute(&self.pool)
            .await
            .map_err(|_| AppError::LedgerUnavailable)?;

        Ok(())
    }

    async fn count_since(
        &self,
        api_key_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_events WHERE api_key_id = $1 AND occurred_at >= $2",
        )
        .bind(api_key_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|_| AppError::LedgerUnavailable)?;

        Ok(count)
    }

    async fn oldest_since(
        &self,
        api_key_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let oldest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MIN(occurred_at) FROM usage_events WHERE api_key_id = $1 AND occurred_at >= $2",
        )
        .bind(api_key_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|_| AppError::LedgerUnavailable)?;

        Ok(oldest)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM usage_events WHERE occurred_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|_| AppError::LedgerUnavailable)?;

        Ok(result.rows_affected())
    }
}
