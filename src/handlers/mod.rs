//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Performs business logic (database queries, validation)
//! 3. Returns HTTP response (JSON, status code)

/// Administrative endpoints (users, keys, pruning)
pub mod admin;
/// Food and category lookup endpoints
pub mod foods;
/// Health check endpoint
pub mod health;
/// Per-key rate-limit status endpoint
pub mod usage;
