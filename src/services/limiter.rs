//! Sliding-window rate limiter.
//!
//! Classic sliding-window-log algorithm: for each configured window the
//! limiter counts the actual usage events inside the trailing duration,
//! instead of resetting a counter at fixed boundaries. A request must
//! satisfy every configured window to be admitted.
//!
//! The limiter is a pure decision function over the [`Ledger`]: it never
//! writes anything. Recording the admitted request is the pipeline's
//! responsibility, which keeps this module independently testable.

use crate::config::Config;
use crate::error::AppError;
use crate::services::ledger::Ledger;
use chrono::{DateTime, Duration, Utc};

/// One `{window duration, max request count}` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuota {
    /// Header-friendly name of the window ("Minute", "Hour", "Day", or
    /// "{n}s" for non-standard durations)
    pub label: String,

    /// Length of the rolling window in seconds
    pub duration_secs: i64,

    /// Maximum number of events permitted inside the window
    pub max_count: i64,
}

impl WindowQuota {
    pub fn new(duration_secs: i64, max_count: i64) -> Self {
        let label = match duration_secs {
            60 => "Minute".to_string(),
            3_600 => "Hour".to_string(),
            86_400 => "Day".to_string(),
            secs => format!("{secs}s"),
        };

        Self {
            label,
            duration_secs,
            max_count,
        }
    }

    fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }
}

/// Usage observed for one window while making an admission decision.
///
/// Carried back to the pipeline so the response headers can be built from
/// the same counts, avoiding a second ledger query per window.
#[derive(Debug, Clone)]
pub struct WindowUsage {
    pub quota: WindowQuota,
    pub used: i64,
}

impl WindowUsage {
    /// Remaining quota in this window, per the counts taken at decision
    /// time (the just-admitted request is not yet in the ledger).
    pub fn remaining(&self) -> i64 {
        (self.quota.max_count - self.used).max(0)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug)]
pub enum Verdict {
    /// All windows have headroom; `usage` holds the per-window counts.
    Admit { usage: Vec<WindowUsage> },

    /// `window` is exhausted. `retry_after` is the number of seconds until
    /// the oldest event inside that window falls outside it. `evaluated`
    /// holds the usage of the windows checked before the violation (the
    /// violated window itself and any larger ones were not counted).
    Reject {
        window: WindowQuota,
        retry_after: u64,
        evaluated: Vec<WindowUsage>,
    },
}

/// The sliding-window limiter for all API keys.
///
/// Holds only the static window configuration; all per-key state lives in
/// the ledger. Windows are kept sorted by ascending duration so the
/// tightest violated window is the one reported to the caller.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Vec<WindowQuota>,
}

impl RateLimiter {
    pub fn new(mut windows: Vec<WindowQuota>) -> Self {
        windows.sort_by_key(|w| w.duration_secs);
        Self { windows }
    }

    /// Build the limiter from the per-minute/hour/day quotas in `Config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            WindowQuota::new(60, config.rate_limit_per_minute),
            WindowQuota::new(3_600, config.rate_limit_per_hour),
            WindowQuota::new(86_400, config.rate_limit_per_day),
        ])
    }

    pub fn windows(&self) -> &[WindowQuota] {
        &self.windows
    }

    /// Longest configured window; the ledger retention horizon must cover
    /// at least this much history.
    pub fn largest_window_secs(&self) -> i64 {
        self.windows.last().map(|w| w.duration_secs).unwrap_or(0)
    }

    /// Decide whether `api_key_id` may proceed at instant `now`.
    ///
    /// Windows are evaluated in ascending duration order and the check
    /// short-circuits on the first violation, so the most restrictive
    /// window's Retry-After is the one reported. Ledger faults propagate
    /// as `LedgerUnavailable`; the pipeline decides whether that fails
    /// open or closed.
    pub async fn check(
        &self,
        ledger: &dyn Ledger,
        api_key_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Verdict, AppError> {
        let mut usage = Vec::with_capacity(self.windows.len());

        for quota in &self.windows {
            let cutoff = now - quota.duration();
            let used = ledger.count_since(api_key_id, cutoff).await?;

            if used >= quota.max_count {
                let retry_after = self
                    .retry_after(ledger, api_key_id, quota, cutoff, now)
                    .await?;
                return Ok(Verdict::Reject {
                    window: quota.clone(),
                    retry_after,
                    evaluated: usage,
                });
            }

            usage.push(WindowUsage {
                quota: quota.clone(),
                used,
            });
        }

        Ok(Verdict::Admit { usage })
    }

    /// Seconds until the violated window has room again.
    ///
    /// Exact form: the window clears when its oldest in-window event ages
    /// out, i.e. at `oldest + duration`. If the oldest event disappeared
    /// between the count and this query (concurrent prune), fall back to
    /// the `duration / max_count` approximation.
    async fn retry_after(
        &self,
        ledger: &dyn Ledger,
        api_key_id: i64,
        quota: &WindowQuota,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let seconds = match ledger.oldest_since(api_key_id, cutoff).await? {
            Some(oldest) => {
                let until_clear = oldest + quota.duration() - now;
                // Ceil to whole seconds so clients never retry early
                (until_clear.num_milliseconds() + 999) / 1_000
            }
            None => quota.duration_secs / quota.max_count.max(1),
        };

        Ok(seconds.max(1) as u64)
    }
}
