//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// API key credential model
pub mod api_key;
/// Food and category reference data
pub mod food;
/// API key owner model
pub mod user;
