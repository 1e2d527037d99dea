//! User models and admin request types.
//!
//! Users exist to own API keys and attribute usage. There is no login or
//! password flow; registration happens through the admin endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a user record from the database.
///
/// Maps to the `users` table. Immutable except for `name`; never deleted
/// while API keys reference it (deletion cascades to the keys).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,

    /// Unique contact email
    pub email: String,

    /// Display name
    pub name: String,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Request body for registering a user.
///
/// ```json
/// {
///   "email": "dev@example.com",
///   "name": "Dev Team"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}
