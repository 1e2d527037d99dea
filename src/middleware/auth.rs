//! API key authentication and rate-limiting pipeline.
//!
//! This middleware gates every protected request, in strict order:
//! 1. Extract the API key from the `X-API-Key` header
//! 2. Resolve it against the credential store; deactivated keys are
//!    rejected here, before any throttling stage
//! 3. Pass the global concurrency admission gate
//! 4. Check every sliding rate-limit window
//! 5. Run the downstream handler while the admission token is held
//! 6. Record the usage event and attach rate-limit headers
//!
//! Each stage short-circuits on failure; only a request that passes them
//! all reaches a handler or is written to the ledger.

use crate::services::api_keys::CredentialStore;
use crate::services::ledger::Ledger;
use crate::services::limiter::{Verdict, WindowUsage};
use crate::{error::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;

/// Authentication context attached to authenticated requests.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// ID of the authenticated API key
    ///
    /// Also the attribution key for usage events.
    pub api_key_id: i64,

    /// ID of the user owning the key
    pub user_id: i64,

    /// Owner's contact email
    pub email: String,

    /// Owner's display name
    pub name: String,
}

/// Request pipeline middleware.
///
/// # Failure semantics
///
/// - Missing header → 401, nothing acquired
/// - Unknown key → 401; deactivated key → 403 (permanent, not
///   retryable), in both cases before the gate or limiter run
/// - Gate at capacity → 503 before any token exists
/// - Window exhausted → 429 with `Retry-After` and the per-window limit
///   headers; the admission token is released by drop on the early return
/// - Ledger unreachable → 503 fail-closed by default, or admission
///   without headers when `RATE_LIMIT_FAIL_OPEN` is set
///
/// The usage event is recorded on a spawned task after the handler
/// responds; a ledger write failure degrades rate-limit accuracy and is
/// logged for operators, but never fails the already-admitted request.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Extract the presented secret
    let presented = request
        .headers()
        .get("X-API-Key")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::MissingApiKey)?
        .to_string();

    // Step 2: Resolve the credential (updates last_used_at in the
    // background). A resolved-but-deactivated key is a permanent 403 and
    // never reaches the gate or the limiter.
    let credential = state.credentials.resolve(&presented).await?;
    if !credential.is_active {
        return Err(AppError::ApiKeyDeactivated);
    }
    let api_key_id = credential.api_key_id;

    // Step 3: Global admission gate. On rejection no slot was taken, so
    // there is nothing to release. The token is held until this function
    // returns — every later exit path, including handler errors and
    // cancellation, releases it via Drop.
    let _token = state.gate.enter().ok_or(AppError::Overloaded)?;

    // Step 4: Sliding-window checks, tightest window first
    let now = Utc::now();
    let usage = match state
        .limiter
        .check(state.ledger.as_ref(), api_key_id, now)
        .await
    {
        Ok(Verdict::Admit { usage }) => Some(usage),
        Ok(Verdict::Reject {
            window,
            retry_after,
            evaluated,
        }) => {
            tracing::debug!(
                api_key_id,
                window = %window.label,
                retry_after,
                "rate limit exceeded"
            );
            return Ok(rate_limited_response(
                &state,
                window.label,
                window.max_count,
                retry_after,
                &evaluated,
            ));
        }
        Err(AppError::LedgerUnavailable) if state.rate_limit_fail_open => {
            tracing::warn!(
                api_key_id,
                "usage ledger unavailable; admitting without rate limiting (fail open)"
            );
            None
        }
        Err(err) => return Err(err),
    };

    let endpoint = request.uri().path().to_string();

    // Make the caller's identity available to handlers
    request.extensions_mut().insert(AuthContext {
        api_key_id,
        user_id: credential.user_id,
        email: credential.email,
        name: credential.name,
    });

    // Step 5: Run the downstream handler inside the token's scope
    let mut response = next.run(request).await;

    // Step 6: Record the admitted request. Server errors are not charged
    // against the quota; client errors (404s, bad params) are.
    if !response.status().is_server_error() {
        let ledger = Arc::clone(&state.ledger);
        tokio::spawn(async move {
            if let Err(err) = ledger.record(api_key_id, &endpoint, now).await {
                tracing::error!(error = %err, api_key_id, "failed to record usage event");
            }
        });
    }

    // Attach quota headers from the counts taken in step 4 (skipped on a
    // fail-open admission, where no counts exist)
    if let Some(usage) = usage {
        append_rate_limit_headers(response.headers_mut(), &usage);
    }

    Ok(response)
}

/// Build the 429 response for an exhausted window.
///
/// The per-window limits are static configuration, so every configured
/// window gets its `X-RateLimit-Limit-<Window>` header even on rejection;
/// `Remaining` is attached for the windows actually counted before the
/// violation (and 0 for the violated one). The `Retry-After` header and
/// body come from the error mapping.
fn rate_limited_response(
    state: &AppState,
    window: String,
    limit: i64,
    retry_after: u64,
    evaluated: &[WindowUsage],
) -> Response {
    let violated = window.clone();
    let mut response = AppError::RateLimited {
        window,
        limit,
        retry_after,
    }
    .into_response();

    let headers = response.headers_mut();
    for quota in state.limiter.windows() {
        insert_header(
            headers,
            format!("X-RateLimit-Limit-{}", quota.label),
            &quota.max_count.to_string(),
        );
    }
    for usage in evaluated {
        insert_header(
            headers,
            format!("X-RateLimit-Remaining-{}", usage.quota.label),
            &usage.remaining().to_string(),
        );
    }
    insert_header(headers, format!("X-RateLimit-Remaining-{violated}"), "0");

    response
}

/// Add `X-RateLimit-Limit-<Window>` / `X-RateLimit-Remaining-<Window>`
/// headers for every configured window.
fn append_rate_limit_headers(headers: &mut HeaderMap, usage: &[WindowUsage]) {
    for window in usage {
        let limit = window.quota.max_count.to_string();
        let remaining = window.remaining().to_string();

        insert_header(
            headers,
            format!("X-RateLimit-Limit-{}", window.quota.label),
            &limit,
        );
        insert_header(
            headers,
            format!("X-RateLimit-Remaining-{}", window.quota.label),
            &remaining,
        );
    }
}

fn insert_header(headers: &mut HeaderMap, name: String, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(name),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::api_keys::ResolvedApiKey;
    use crate::services::gate::AdmissionGate;
    use crate::services::limiter::{RateLimiter, WindowQuota};
    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::get,
    };
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Credential store returning a fixed outcome for any presented key.
    struct FixedCredentials {
        outcome: Result<ResolvedApiKey, AppError>,
    }

    impl FixedCredentials {
        fn key(is_active: bool) -> Self {
            Self {
                outcome: Ok(ResolvedApiKey {
                    api_key_id: 7,
                    user_id: 1,
                    email: "dev@example.com".to_string(),
                    name: "Dev Team".to_string(),
                    is_active,
                }),
            }
        }

        fn unknown() -> Self {
            Self {
                outcome: Err(AppError::InvalidApiKey),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for FixedCredentials {
        async fn resolve(&self, _presented: &str) -> Result<ResolvedApiKey, AppError> {
            match &self.outcome {
                Ok(resolved) => Ok(resolved.clone()),
                Err(AppError::InvalidApiKey) => Err(AppError::InvalidApiKey),
                Err(_) => unreachable!(),
            }
        }
    }

    /// In-memory ledger that counts how often it was queried and written.
    #[derive(Default)]
    struct RecordingLedger {
        events: Mutex<Vec<(i64, DateTime<Utc>)>>,
        count_queries: AtomicUsize,
        records: AtomicUsize,
        unavailable: bool,
    }

    impl RecordingLedger {
        fn with_events(events: Vec<(i64, DateTime<Utc>)>) -> Self {
            Self {
                events: Mutex::new(events),
                ..Self::default()
            }
        }

        fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Ledger for RecordingLedger {
        async fn record(
            &self,
            api_key_id: i64,
            _endpoint: &str,
            occurred_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            if self.unavailable {
                return Err(AppError::LedgerUnavailable);
            }
            self.events.lock().unwrap().push((api_key_id, occurred_at));
            self.records.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn count_since(
            &self,
            api_key_id: i64,
            cutoff: DateTime<Utc>,
        ) -> Result<i64, AppError> {
            if self.unavailable {
                return Err(AppError::LedgerUnavailable);
            }
            self.count_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|(key, at)| *key == api_key_id && *at >= cutoff)
                .count() as i64)
        }

        async fn oldest_since(
            &self,
            api_key_id: i64,
            cutoff: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>, AppError> {
            if self.unavailable {
                return Err(AppError::LedgerUnavailable);
            }
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|(key, at)| *key == api_key_id && *at >= cutoff)
                .map(|(_, at)| *at)
                .min())
        }

        async fn prune(&self, _older_than: DateTime<Utc>) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    fn test_state(
        credentials: FixedCredentials,
        ledger: Arc<RecordingLedger>,
        max_concurrent: usize,
        fail_open: bool,
    ) -> AppState {
        AppState {
            // Lazy pool: never connects, and nothing in these tests
            // touches it
            pool: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://localhost/unused")
                .unwrap(),
            credentials: Arc::new(credentials),
            gate: AdmissionGate::new(max_concurrent),
            limiter: Arc::new(RateLimiter::new(vec![
                WindowQuota::new(60, 10),
                WindowQuota::new(3_600, 200),
            ])),
            ledger,
            rate_limit_fail_open: fail_open,
            ledger_retention: Duration::from_secs(7 * 86_400),
        }
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .route_layer(from_fn_with_state(state.clone(), require_api_key))
            .with_state(state)
    }

    fn request(with_key: bool) -> axum::http::Request<Body> {
        let builder = axum::http::Request::builder().uri("/protected");
        let builder = if with_key {
            builder.header("X-API-Key", "kkm_test")
        } else {
            builder
        };
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_key_is_401() {
        let ledger = Arc::new(RecordingLedger::default());
        let state = test_state(FixedCredentials::key(true), Arc::clone(&ledger), 5, false);

        let response = app(state).oneshot(request(false)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ledger.count_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_key_is_401() {
        let ledger = Arc::new(RecordingLedger::default());
        let state = test_state(FixedCredentials::unknown(), Arc::clone(&ledger), 5, false);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deactivated_key_is_403_and_never_reaches_the_limiter() {
        let ledger = Arc::new(RecordingLedger::default());
        let state = test_state(FixedCredentials::key(false), Arc::clone(&ledger), 5, false);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        // Short-circuit before step 4: the ledger was never consulted,
        // and nothing was recorded
        assert_eq!(ledger.count_queries.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.records.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn admitted_request_gets_quota_headers_and_is_recorded() {
        let ledger = Arc::new(RecordingLedger::default());
        let state = test_state(FixedCredentials::key(true), Arc::clone(&ledger), 5, false);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Limit-Minute").unwrap(), "10");
        assert_eq!(headers.get("X-RateLimit-Remaining-Minute").unwrap(), "10");
        assert_eq!(headers.get("X-RateLimit-Limit-Hour").unwrap(), "200");

        // The usage event is written on a spawned task; give it a moment
        let mut waited = 0;
        while ledger.records.load(Ordering::SeqCst) == 0 && waited < 200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
        }
        assert_eq!(ledger.records.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.events.lock().unwrap()[0].0, 7);
    }

    #[tokio::test]
    async fn exhausted_window_is_429_with_limit_headers() {
        let now = Utc::now();
        let ledger = Arc::new(RecordingLedger::with_events(
            (0..10).map(|_| (7, now)).collect(),
        ));
        let state = test_state(FixedCredentials::key(true), Arc::clone(&ledger), 5, false);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get("Retry-After").unwrap(), "60");
        // Static limits are advertised for every window even on rejection
        assert_eq!(headers.get("X-RateLimit-Limit-Minute").unwrap(), "10");
        assert_eq!(headers.get("X-RateLimit-Limit-Hour").unwrap(), "200");
        // The violated window has nothing remaining; the hour window was
        // never counted (short-circuit), so it has no Remaining header
        assert_eq!(headers.get("X-RateLimit-Remaining-Minute").unwrap(), "0");
        assert!(headers.get("X-RateLimit-Remaining-Hour").is_none());
        // The rejected request was not recorded
        assert_eq!(ledger.records.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gate_at_capacity_is_503() {
        let ledger = Arc::new(RecordingLedger::default());
        // Zero-capacity gate: every request is an overload rejection
        let state = test_state(FixedCredentials::key(true), Arc::clone(&ledger), 0, false);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("Retry-After"));
        assert_eq!(ledger.count_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ledger_fault_fails_closed_by_default() {
        let ledger = Arc::new(RecordingLedger::unavailable());
        let state = test_state(FixedCredentials::key(true), Arc::clone(&ledger), 5, false);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ledger_fault_admits_without_headers_when_fail_open() {
        let ledger = Arc::new(RecordingLedger::unavailable());
        let state = test_state(FixedCredentials::key(true), Arc::clone(&ledger), 5, true);

        let response = app(state).oneshot(request(true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // No counts were available, so no quota headers are attached
        assert!(response.headers().get("X-RateLimit-Limit-Minute").is_none());
    }

    #[test]
    fn quota_headers_cover_limit_and_remaining_per_window() {
        let usage = vec![
            WindowUsage {
                quota: WindowQuota::new(60, 10),
                used: 3,
            },
            WindowUsage {
                quota: WindowQuota::new(3_600, 200),
                used: 3,
            },
        ];

        let mut headers = HeaderMap::new();
        append_rate_limit_headers(&mut headers, &usage);

        assert_eq!(headers.get("X-RateLimit-Limit-Minute").unwrap(), "10");
        assert_eq!(headers.get("X-RateLimit-Remaining-Minute").unwrap(), "7");
        assert_eq!(headers.get("X-RateLimit-Limit-Hour").unwrap(), "200");
        assert_eq!(headers.get("X-RateLimit-Remaining-Hour").unwrap(), "197");
    }
}
