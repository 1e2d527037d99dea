//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate and rate-limit requests
//! - Modify request/response
//! - Short-circuit requests (reject unauthorized or throttled ones)

/// API key authentication and rate-limiting pipeline
pub mod auth;
