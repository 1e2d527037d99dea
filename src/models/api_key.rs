//! API key models and admin request/response types.
//!
//! API keys authenticate clients of the food-calorie API. The database
//! stores only a SHA-256 hash of each secret; the plaintext exists in a
//! response exactly once, at issuance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier
/// - `user_id`: Owning user
/// - `key_hash`: SHA-256 hash of the actual API key (globally unique)
/// - `name`: Human-readable label for the key
/// - `is_active`: Whether the key is currently valid
/// - `created_at` / `last_used_at`: Lifecycle timestamps
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: i64,

    /// User that owns this key
    pub user_id: i64,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    /// Human-readable label
    pub name: String,

    /// Whether this API key is currently active
    ///
    /// Inactive keys are rejected during authentication with a 403. This
    /// is how access is revoked; key rows are never deleted.
    pub is_active: bool,

    /// Timestamp when this API key was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent successful authentication, updated
    /// in the background (may lag slightly behind real usage)
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A freshly issued key: the database record plus the plaintext secret.
///
/// The plaintext is not a field of [`ApiKey`] on purpose: it only exists
/// on this one-shot issuance path.
#[derive(Debug)]
pub struct IssuedApiKey {
    /// Plaintext secret, shown to the caller exactly once
    pub api_key: String,

    /// The stored credential record
    pub record: ApiKey,
}

/// Request body for issuing a new API key.
///
/// ```json
/// {
///   "user_id": 1,
///   "name": "Mobile app key"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct IssueApiKeyRequest {
    /// Owner of the new key
    pub user_id: i64,

    /// Optional label (defaults to "Default API Key")
    pub name: Option<String>,
}

/// Response body for key issuance.
///
/// Contains the plaintext secret; every other endpoint only ever sees
/// the hash.
#[derive(Debug, Serialize)]
pub struct IssuedApiKeyResponse {
    /// Key record identifier
    pub id: i64,

    /// Plaintext secret
    pub api_key: String,

    /// Key label
    pub name: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Reminder that the secret is shown only once
    pub message: String,
}

impl From<IssuedApiKey> for IssuedApiKeyResponse {
    fn from(issued: IssuedApiKey) -> Self {
        Self {
            id: issued.record.id,
            api_key: issued.api_key,
            name: issued.record.name,
            created_at: issued.record.created_at,
            message: "API key created successfully. Store this key securely as it won't be shown again.".to_string(),
        }
    }
}
