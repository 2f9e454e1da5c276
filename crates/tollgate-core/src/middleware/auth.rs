use crate::auth::{
    api_key::{ApiKey, NewApiKey},
    repository::ApiKeyRepository,
    AuthError, AuthenticatedKey,
};
use std::sync::Arc;

const MIN_API_KEY_NAME_LENGTH: usize = 1;
const MAX_API_KEY_NAME_LENGTH: usize = 64;

/// A freshly created key. `raw_key` is shown to the user once and never stored.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    pub api_key: ApiKey,
    pub raw_key: String,
}

/// Issues, verifies, lists and revokes user API keys.
///
/// Successful authentications are not cached: a revoked key is rejected on its very next use.
pub struct ApiKeyAuthenticator {
    repository: Arc<dyn ApiKeyRepository>,
    max_keys_per_user: u32,
}

impl ApiKeyAuthenticator {
    pub fn new(repository: Arc<dyn ApiKeyRepository>, max_keys_per_user: u32) -> Self {
        Self { repository, max_keys_per_user }
    }

    #[must_use]
    pub fn max_keys_per_user(&self) -> u32 {
        self.max_keys_per_user
    }

    /// # Errors
    /// Returns `AuthError::InvalidKey` if the key is malformed, unknown or revoked, or
    /// `AuthError::StorageError` if the lookup fails.
    pub async fn authenticate(&self, raw_key: &str) -> Result<AuthenticatedKey, AuthError> {
        let api_key = self
            .repository
            .find_and_verify_key(raw_key)
            .await?
            .ok_or(AuthError::InvalidKey)?;

        let repository = self.repository.clone();
        let key_id = api_key.id;
        tokio::spawn(async move {
            if let Err(e) = repository.update_last_used(key_id).await {
                tracing::warn!(key_id, error = %e, "failed to update API key last_used_at");
            }
        });

        Ok(AuthenticatedKey { key_id: api_key.id, user_id: api_key.user_id })
    }

    /// Fails with `AuthError::LimitExceeded` if the user already holds the maximum number
    /// of active keys.
    ///
    /// # Errors
    /// Returns `AuthError::LimitExceeded` or `AuthError::StorageError`.
    pub async fn enforce_quota(&self, user_id: i64) -> Result<(), AuthError> {
        let active = self.repository.count_active(user_id).await?;
        if active >= i64::from(self.max_keys_per_user) {
            return Err(AuthError::LimitExceeded { limit: self.max_keys_per_user });
        }
        Ok(())
    }

    /// Creates a key for `user_id`.
    ///
    /// The quota is checked up front to avoid hashing a key that can't be stored, then again
    /// atomically by the insert itself.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidName`, `AuthError::LimitExceeded`, or a storage/key generation
    /// error.
    pub async fn create(&self, user_id: i64, name: &str) -> Result<CreatedApiKey, AuthError> {
        let name = name.trim();
        validate_api_key_name(name).map_err(AuthError::InvalidName)?;
        self.enforce_quota(user_id).await?;

        let raw_key = ApiKey::generate()?;
        let (owned_name, owned_key) = (name.to_string(), raw_key.clone());
        let new_key = tokio::task::spawn_blocking(move || {
            NewApiKey::from_plaintext(user_id, &owned_name, &owned_key)
        })
        .await
        .map_err(|e| AuthError::KeyGenerationError(format!("API key hashing task failed: {e}")))??;

        let api_key = self
            .repository
            .create_within_limit(new_key, self.max_keys_per_user)
            .await?
            .ok_or(AuthError::LimitExceeded { limit: self.max_keys_per_user })?;

        tracing::info!(user_id, key_id = api_key.id, prefix = %api_key.key_prefix, "API key created");
        Ok(CreatedApiKey { api_key, raw_key })
    }

    /// # Errors
    /// Returns `AuthError::StorageError` if the query fails.
    pub async fn list(&self, user_id: i64) -> Result<Vec<ApiKey>, AuthError> {
        self.repository.list_for_user(user_id).await
    }

    /// Soft-revokes one of the user's keys.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidKey` if the key doesn't belong to the user or is already revoked.
    pub async fn revoke(&self, user_id: i64, key_id: i64) -> Result<(), AuthError> {
        if !self.repository.revoke_key(user_id, key_id).await? {
            return Err(AuthError::InvalidKey);
        }
        tracing::info!(user_id, key_id, "API key revoked");
        Ok(())
    }
}

/// # Errors
/// Returns a human-readable reason when the name is rejected.
pub fn validate_api_key_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("API key name cannot be empty".to_string());
    }
    if name.chars().count() < MIN_API_KEY_NAME_LENGTH {
        return Err(format!(
            "API key name too short. Minimum length is {MIN_API_KEY_NAME_LENGTH} character(s)."
        ));
    }
    if name.chars().count() > MAX_API_KEY_NAME_LENGTH {
        return Err(format!(
            "API key name too long. Maximum length is {MAX_API_KEY_NAME_LENGTH} characters."
        ));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_') {
        return Err(
            "API key name contains invalid characters. Only alphanumeric, spaces, dashes, and underscores are allowed."
                .to_string(),
        );
    }
    Ok(())
}
