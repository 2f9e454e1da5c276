//! Rotating refresh tokens with replay detection.
//!
//! Every login starts a **family**. Each successful [`RefreshTokenStore::rotate`] revokes the
//! presented token and issues its successor in the same family, so at most one member is live.
//! Presenting a token that was already rotated means either a client bug or a stolen token;
//! either way the whole family is revoked and the legitimate holder has to log in again.
//!
//! Raw tokens are 256-bit random values, hex encoded. Only their SHA-256 digest is stored.

use super::{repository::RefreshTokenRepository, AuthError};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

const RAW_TOKEN_BYTES: usize = 32;

/// Persisted refresh token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    /// `hex(SHA256(raw_token))`
    pub token_hash: String,
    /// Groups a rotation chain descended from one login
    pub family_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// A token is expired from its `expires_at` instant onwards.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub family_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A freshly started family. `raw_token` is handed to the client and never seen again.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub raw_token: String,
    pub family_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Successor issued by a successful rotation.
#[derive(Debug, Clone)]
pub struct RotatedToken {
    pub user_id: i64,
    pub raw_token: String,
    pub family_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of presenting a refresh token.
///
/// Only `Rotated` authenticates the caller. The other outcomes are reported separately for
/// logging and tests; HTTP callers must treat them identically.
#[derive(Debug, Clone)]
pub enum Rotation {
    Rotated(RotatedToken),
    /// No token with this hash exists (or the input was malformed)
    NotFound,
    /// The token was live but past its expiry; it has now been revoked
    Expired,
    /// The token had already been revoked; its whole family has now been revoked
    Replayed,
}

impl Rotation {
    #[must_use]
    pub fn into_rotated(self) -> Option<RotatedToken> {
        match self {
            Self::Rotated(token) => Some(token),
            Self::NotFound | Self::Expired | Self::Replayed => None,
        }
    }

    /// Converts to a `Result`, folding every failure into an authentication error.
    ///
    /// # Errors
    ///
    /// [`AuthError::ReplayDetected`] for replays, [`AuthError::Unauthenticated`] otherwise.
    pub fn into_result(self) -> Result<RotatedToken, AuthError> {
        match self {
            Self::Rotated(token) => Ok(token),
            Self::Replayed => Err(AuthError::ReplayDetected),
            Self::NotFound | Self::Expired => Err(AuthError::Unauthenticated),
        }
    }
}

/// Issues, rotates, revokes and purges refresh tokens.
pub struct RefreshTokenStore {
    repository: Arc<dyn RefreshTokenRepository>,
    max_age: Duration,
    retention: Duration,
}

impl RefreshTokenStore {
    /// `max_age` is the lifetime of each token; `retention` is how long expired rows are kept
    /// before [`purge_expired`](Self::purge_expired) deletes them.
    pub fn new(
        repository: Arc<dyn RefreshTokenRepository>,
        max_age: Duration,
        retention: Duration,
    ) -> Self {
        Self { repository, max_age, retention }
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Generates a raw token: 64 lowercase hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if the system RNG fails.
    pub fn generate_raw() -> Result<String, AuthError> {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; RAW_TOKEN_BYTES];
        rng.fill(&mut bytes).map_err(|_| {
            AuthError::KeyGenerationError("Failed to generate secure random bytes".to_string())
        })?;
        Ok(hex::encode(bytes))
    }

    #[must_use]
    pub fn hash_token(raw_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_token.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn is_valid_format(raw_token: &str) -> bool {
        raw_token.len() == RAW_TOKEN_BYTES * 2
            && raw_token.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Starts a new family for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if random generation or the insert fails.
    pub async fn create(&self, user_id: i64) -> Result<IssuedRefreshToken, AuthError> {
        self.create_at(user_id, Utc::now()).await
    }

    /// [`create`](Self::create) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns an error if random generation or the insert fails.
    pub async fn create_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefreshToken, AuthError> {
        let raw_token = Self::generate_raw()?;
        let family_id = Uuid::new_v4().to_string();
        let expires_at = now + self.max_age;

        self.repository
            .insert(NewRefreshToken {
                user_id,
                token_hash: Self::hash_token(&raw_token),
                family_id: family_id.clone(),
                expires_at,
                created_at: now,
            })
            .await?;

        tracing::debug!(user_id, family_id = %family_id, "refresh token family started");
        Ok(IssuedRefreshToken { raw_token, family_id, expires_at })
    }

    /// Exchanges a raw token for its successor.
    ///
    /// # Errors
    ///
    /// Only storage failures are errors; every rejection is a [`Rotation`] value.
    pub async fn rotate(&self, raw_token: &str) -> Result<Rotation, AuthError> {
        self.rotate_at(raw_token, Utc::now()).await
    }

    /// [`rotate`](Self::rotate) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Only storage failures are errors; every rejection is a [`Rotation`] value.
    pub async fn rotate_at(
        &self,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Rotation, AuthError> {
        if !Self::is_valid_format(raw_token) {
            return Ok(Rotation::NotFound);
        }

        let Some(token) = self.repository.find_by_hash(&Self::hash_token(raw_token)).await? else {
            return Ok(Rotation::NotFound);
        };

        if token.is_revoked() {
            self.revoke_family_on_replay(&token, now).await?;
            return Ok(Rotation::Replayed);
        }

        if token.is_expired_at(now) {
            self.repository.revoke_token(token.id, now).await?;
            tracing::debug!(user_id = token.user_id, family_id = %token.family_id, "expired refresh token presented");
            return Ok(Rotation::Expired);
        }

        let new_raw_token = Self::generate_raw()?;
        let expires_at = now + self.max_age;
        let replacement = NewRefreshToken {
            user_id: token.user_id,
            token_hash: Self::hash_token(&new_raw_token),
            family_id: token.family_id.clone(),
            expires_at,
            created_at: now,
        };

        if !self.repository.rotate(token.id, replacement, now).await? {
            // Lost the race against a concurrent rotation of the same token.
            self.revoke_family_on_replay(&token, now).await?;
            return Ok(Rotation::Replayed);
        }

        Ok(Rotation::Rotated(RotatedToken {
            user_id: token.user_id,
            raw_token: new_raw_token,
            family_id: token.family_id,
            expires_at,
        }))
    }

    async fn revoke_family_on_replay(
        &self,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let revoked = self.repository.revoke_family(&token.family_id, now).await?;
        tracing::warn!(
            user_id = token.user_id,
            family_id = %token.family_id,
            revoked,
            "refresh token replay detected, family revoked"
        );
        Ok(())
    }

    /// Revokes every live token of a user (logout everywhere, password change).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the update fails.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, AuthError> {
        let revoked = self.repository.revoke_all_for_user(user_id, Utc::now()).await?;
        tracing::info!(user_id, revoked, "all refresh tokens revoked");
        Ok(revoked)
    }

    /// Revokes a single token (logout). Returns `false` if it was unknown or already dead.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the lookup or update fails.
    pub async fn revoke_one(&self, raw_token: &str) -> Result<bool, AuthError> {
        if !Self::is_valid_format(raw_token) {
            return Ok(false);
        }

        match self.repository.find_by_hash(&Self::hash_token(raw_token)).await? {
            Some(token) => self.repository.revoke_token(token.id, Utc::now()).await,
            None => Ok(false),
        }
    }

    /// Deletes rows that expired more than the retention period ago.
    ///
    /// Revoked rows are kept until then so replays of old tokens are still recognised.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        self.purge_expired_at(Utc::now()).await
    }

    /// [`purge_expired`](Self::purge_expired) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the delete fails.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        self.repository.delete_expired_before(now - self.retention).await
    }
}
