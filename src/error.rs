//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing, invalid, or deactivated API keys
/// - **Throttling Errors**: Rate-limit and concurrency-cap rejections
/// - **Resource Errors**: Requested resources not found
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No `X-API-Key` header was presented.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("API key required")]
    MissingApiKey,

    /// The presented API key does not match any issued credential.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The API key exists but has been deactivated.
    ///
    /// Deactivation is permanent for the credential; this is not a
    /// retryable condition, which is why it is distinct from
    /// `InvalidApiKey`. Returns HTTP 403 Forbidden.
    #[error("API key has been deactivated")]
    ApiKeyDeactivated,

    /// A sliding-window quota was exceeded.
    ///
    /// Returns HTTP 429 Too Many Requests with a `Retry-After` header.
    /// `window` names the violated window (e.g., "Minute") and
    /// `retry_after` is the number of seconds until the oldest event in
    /// that window falls outside it.
    #[error("Rate limit exceeded: {limit} requests per {window}")]
    RateLimited {
        window: String,
        limit: i64,
        retry_after: u64,
    },

    /// The global concurrency cap was hit before this request could be
    /// admitted.
    ///
    /// Returns HTTP 503 Service Unavailable with a generic `Retry-After`.
    #[error("Server overloaded. Maximum concurrent requests exceeded")]
    Overloaded,

    /// The usage ledger could not be read or written while making a
    /// rate-limit decision.
    ///
    /// With fail-closed configuration (the default) this rejects the
    /// request with HTTP 503, preserving the rate-limit guarantee at the
    /// cost of availability.
    #[error("Usage ledger unavailable")]
    LedgerUnavailable,

    /// Requested food does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Food not found")]
    FoodNotFound,

    /// Requested user does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("User not found")]
    UserNotFound,

    /// Requested API key record does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("API key not found")]
    ApiKeyNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Seconds clients should wait before retrying after an overload rejection.
const OVERLOADED_RETRY_AFTER_SECS: u64 = 5;

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `MissingApiKey` / `InvalidApiKey` → 401 Unauthorized
/// - `ApiKeyDeactivated` → 403 Forbidden
/// - `RateLimited` → 429 Too Many Requests (+ `Retry-After`)
/// - `Overloaded` / `LedgerUnavailable` → 503 Service Unavailable
/// - `FoodNotFound` / `UserNotFound` / `ApiKeyNotFound` → 404 Not Found
/// - `InvalidRequest` → 400 Bad Request
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Recoverable rejections carry a Retry-After hint
        let retry_after = match self {
            AppError::RateLimited { retry_after, .. } => Some(retry_after),
            AppError::Overloaded => Some(OVERLOADED_RETRY_AFTER_SECS),
            _ => None,
        };

        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "missing_api_key",
                self.to_string(),
            ),
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::ApiKeyDeactivated => (
                StatusCode::FORBIDDEN,
                "api_key_deactivated",
                self.to_string(),
            ),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                self.to_string(),
            ),
            AppError::Overloaded => {
                (StatusCode::SERVICE_UNAVAILABLE, "overloaded", self.to_string())
            }
            AppError::LedgerUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ledger_unavailable",
                self.to_string(),
            ),
            AppError::FoodNotFound => {
                (StatusCode::NOT_FOUND, "food_not_found", self.to_string())
            }
            AppError::UserNotFound => {
                (StatusCode::NOT_FOUND, "user_not_found", self.to_string())
            }
            AppError::ApiKeyNotFound => {
                (StatusCode::NOT_FOUND, "api_key_not_found", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        let mut response = (status, body).into_response();

        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = AppError::RateLimited {
            window: "Minute".to_string(),
            limit: 10,
            retry_after: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).unwrap().to_str().unwrap(),
            "42"
        );
    }

    #[test]
    fn overloaded_response_is_503_with_retry_after() {
        let response = AppError::Overloaded.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(RETRY_AFTER));
    }

    #[test]
    fn deactivated_key_is_forbidden_not_unauthorized() {
        let response = AppError::ApiKeyDeactivated.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
