//! Rate-limit status endpoint for the calling API key.

use crate::{
    error::AppError, middleware::auth::AuthContext, services::ledger::Ledger, state::AppState,
};
use axum::{Extension, Json, extract::State};
use chrono::{Duration, Utc};
use serde_json::{Map, Value, json};

/// Current per-window usage for the authenticated key.
///
/// # Endpoint
///
/// `GET /usage`
///
/// Recomputes the window counts read-only; it does not write anything
/// itself, though like every protected route the call still passes the
/// pipeline and is counted there.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "active",
///   "user": { "email": "dev@example.com", "name": "Dev Team" },
///   "limits": {
///     "per_minute": { "limit": 10, "used": 3, "remaining": 7 },
///     "per_hour": { "limit": 200, "used": 3, "remaining": 197 },
///     "per_day": { "limit": 500, "used": 3, "remaining": 497 }
///   }
/// }
/// ```
pub async fn usage_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let mut limits = Map::new();

    for quota in state.limiter.windows() {
        let cutoff = now - Duration::seconds(quota.duration_secs);
        let used = state.ledger.count_since(auth.api_key_id, cutoff).await?;

        limits.insert(
            format!("per_{}", quota.label.to_lowercase()),
            json!({
                "limit": quota.max_count,
                "used": used,
                "remaining": (quota.max_count - used).max(0),
            }),
        );
    }

    Ok(Json(json!({
        "status": "active",
        "user": {
            "email": auth.email,
            "name": auth.name,
        },
        "limits": limits,
    })))
}
