//! Administrative handlers: user registration, key issuance and
//! deactivation, and ledger pruning.
//!
//! These routes are the transport for the credential store and ledger
//! maintenance contracts. They are mounted under `/admin` and are not
//! behind the API-key pipeline; in deployment they are expected to be
//! reachable only by operators (firewalled or proxied), the same way the
//! original setup tooling was.

use crate::{
    error::AppError,
    models::api_key::{IssueApiKeyRequest, IssuedApiKeyResponse},
    models::user::{CreateUserRequest, User},
    services::api_keys,
    services::ledger::Ledger,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

/// Register a user that can own API keys.
///
/// # Endpoint
///
/// `POST /admin/users`
///
/// # Response
///
/// - **Success (201 Created)**: the new user
/// - **Error (400)**: email already registered
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, name)
        VALUES ($1, $2)
        RETURNING id, email, name, created_at
        "#,
    )
    .bind(&request.email)
    .bind(&request.name)
    .fetch_one(&state.pool)
    .await
    .map_err(|err| {
        if err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            AppError::InvalidRequest("email is already registered".to_string())
        } else {
            AppError::Database(err)
        }
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Issue a new API key for a user.
///
/// # Endpoint
///
/// `POST /admin/api-keys`
///
/// # Response
///
/// - **Success (201 Created)**: key record including the plaintext
///   secret, which is shown only in this response
/// - **Error (404)**: no such user
pub async fn issue_api_key(
    State(state): State<AppState>,
    Json(request): Json<IssueApiKeyRequest>,
) -> Result<(StatusCode, Json<IssuedApiKeyResponse>), AppError> {
    let issued = api_keys::issue(&state.pool, request.user_id, request.name).await?;

    tracing::info!(
        api_key_id = issued.record.id,
        user_id = request.user_id,
        "issued API key"
    );

    Ok((StatusCode::CREATED, Json(issued.into())))
}

/// Deactivate an API key.
///
/// # Endpoint
///
/// `DELETE /admin/api-keys/{id}`
///
/// The record is kept (usage events stay attributed); the key simply
/// fails all future authentication with 403.
///
/// # Response
///
/// - **Success (204 No Content)**
/// - **Error (404)**: no such key
pub async fn deactivate_api_key(
    State(state): State<AppState>,
    Path(api_key_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    api_keys::deactivate(&state.pool, api_key_id).await?;

    tracing::info!(api_key_id, "deactivated API key");

    Ok(StatusCode::NO_CONTENT)
}

/// Prune usage events past the retention horizon.
///
/// # Endpoint
///
/// `POST /admin/usage-events/prune`
///
/// The horizon comes from `LEDGER_RETENTION_DAYS`, which startup
/// validation guarantees to be at least the largest rate-limit window, so
/// pruning can never delete an event a window count still needs. Safe to
/// call while requests are being served.
///
/// # Response (200 OK)
///
/// ```json
/// { "deleted": 1204, "older_than": "2026-08-23T12:00:00Z" }
/// ```
pub async fn prune_usage_events(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let older_than = Utc::now()
        - Duration::seconds(state.ledger_retention.as_secs() as i64);

    let deleted = state.ledger.prune(older_than).await?;

    tracing::info!(deleted, %older_than, "pruned usage events");

    Ok(Json(json!({
        "deleted": deleted,
        "older_than": older_than,
    })))
}
