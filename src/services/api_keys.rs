//! Credential store: issuing, resolving, and deactivating API keys.
//!
//! Plaintext secrets are never stored. At issuance the secret is returned
//! exactly once and only its SHA-256 hash is persisted; resolution hashes
//! the presented secret and looks it up by hash, so no plaintext
//! comparison ever happens.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::api_key::{ApiKey, IssuedApiKey};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Prefix identifying keys issued by this service.
const KEY_PREFIX: &str = "kkm";

/// An API key resolved from a presented secret, joined with its owner.
///
/// This is what the authentication pipeline attaches to the request.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResolvedApiKey {
    /// ID of the matching api_keys row
    pub api_key_id: i64,

    /// ID of the owning user
    pub user_id: i64,

    /// Owner's contact email
    pub email: String,

    /// Owner's display name
    pub name: String,

    /// Active flag; the pipeline rejects inactive credentials with a
    /// permanent 403 before any throttling stage runs
    pub is_active: bool,
}

/// Lookup contract for presented API keys.
///
/// Only what the request pipeline needs; issuance and deactivation are
/// administrative operations that go straight to the database. The trait
/// seam keeps the pipeline testable without a live Postgres.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a presented secret to its credential and owner.
    ///
    /// Returns the credential whether or not it is active, so the caller
    /// can distinguish a deactivated key (permanent 403) from an unknown
    /// one (401). `InvalidApiKey` when no credential matches the hash.
    async fn resolve(&self, presented: &str) -> Result<ResolvedApiKey, AppError>;
}

/// Generate a new API key secret.
///
/// Format: `kkm_<64 hex chars>` from 32 bytes of OS randomness.
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{}_{}", KEY_PREFIX, hex::encode(bytes))
}

/// Hash an API key secret for storage and lookup.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Issue a new API key for a user.
///
/// Returns the plaintext secret exactly once; it cannot be recovered
/// later, only reissued. The stored hash is globally unique (enforced by
/// the database constraint).
pub async fn issue(
    pool: &DbPool,
    user_id: i64,
    name: Option<String>,
) -> Result<IssuedApiKey, AppError> {
    // Verify the owner exists so a bad user_id is a 404, not a
    // foreign-key violation surfacing as a 500
    let owner_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    if !owner_exists {
        return Err(AppError::UserNotFound);
    }

    let api_key = generate_api_key();
    let key_hash = hash_api_key(&api_key);

    let record = sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (user_id, key_hash, name)
        VALUES ($1, $2, $3)
        RETURNING id, user_id, key_hash, name, is_active, created_at, last_used_at
        "#,
    )
    .bind(user_id)
    .bind(&key_hash)
    .bind(name.unwrap_or_else(|| "Default API Key".to_string()))
    .fetch_one(pool)
    .await?;

    Ok(IssuedApiKey { api_key, record })
}

/// Credential store backed by the `api_keys` table.
#[derive(Debug, Clone)]
pub struct SqlCredentialStore {
    pool: DbPool,
}

impl SqlCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    /// Hash the presented secret and look it up by hash, joined with the
    /// owning user. No plaintext is ever compared.
    ///
    /// # Side effect
    ///
    /// For an active credential, `last_used_at` is updated on a spawned
    /// task; the authorization decision never waits on it, and its
    /// failure is only logged.
    async fn resolve(&self, presented: &str) -> Result<ResolvedApiKey, AppError> {
        let key_hash = hash_api_key(presented);

        let resolved = sqlx::query_as::<_, ResolvedApiKey>(
            r#"
            SELECT ak.id AS api_key_id, ak.user_id, u.email, u.name, ak.is_active
            FROM api_keys ak
            JOIN users u ON u.id = ak.user_id
            WHERE ak.key_hash = $1
            "#,
        )
        .bind(&key_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::InvalidApiKey)?;

        // Fire-and-forget last-used bookkeeping, for live keys only
        if resolved.is_active {
            let pool = self.pool.clone();
            let api_key_id = resolved.api_key_id;
            tokio::spawn(async move {
                let result =
                    sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
                        .bind(api_key_id)
                        .execute(&pool)
                        .await;

                if let Err(err) = result {
                    tracing::warn!(error = %err, api_key_id, "failed to update last_used_at");
                }
            });
        }

        Ok(resolved)
    }
}

/// Deactivate an API key.
///
/// Keys are never deleted, so usage events keep their attribution. A
/// deactivated key fails every subsequent `resolve` with
/// `ApiKeyDeactivated`.
pub async fn deactivate(pool: &DbPool, api_key_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE api_keys SET is_active = false WHERE id = $1")
        .bind(api_key_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::ApiKeyNotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_prefix_and_hex_body() {
        let key = generate_api_key();

        let body = key.strip_prefix("kkm_").expect("missing kkm_ prefix");
        assert_eq!(body.len(), 64);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_api_key();
        let b = generate_api_key();

        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_deterministic_sha256_hex() {
        let key = "kkm_test";

        assert_eq!(hash_api_key(key), hash_api_key(key));
        assert_eq!(hash_api_key(key).len(), 64);
        // Known digest of "kkm_test"
        assert_eq!(
            hash_api_key(key),
            "0dba02119e3e002deaa7b308c918c79b553a931e7ae75503dff646c87bedf226"
        );
    }

    #[test]
    fn mutated_secret_hashes_differently() {
        let key = generate_api_key();
        let mut mutated = key.clone();
        mutated.pop();
        mutated.push('!');

        assert_ne!(hash_api_key(&key), hash_api_key(&mutated));
    }
}
