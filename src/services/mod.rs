//! Business logic, independent of HTTP transport.
//!
//! The four pieces of the request-gating core live here; the request
//! pipeline in `middleware::auth` orchestrates them.

/// Credential store: issue, resolve, deactivate API keys
pub mod api_keys;
/// Global concurrency admission gate
pub mod gate;
/// Append-only usage-event ledger
pub mod ledger;
/// Sliding-window rate limiter
pub mod limiter;
