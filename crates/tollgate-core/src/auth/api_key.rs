use crate::auth::AuthError;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix that marks a credential as an API key rather than an access token.
pub const API_KEY_PREFIX: &str = "ob_";

const RANDOM_BYTES: usize = 32;
const KEY_LENGTH: usize = API_KEY_PREFIX.len() + RANDOM_BYTES * 2;
const DISPLAY_PREFIX_LENGTH: usize = API_KEY_PREFIX.len() + 8;

/// Database model for a user's API key.
///
/// The plaintext key is shown once at creation and never stored. Lookup goes through
/// `blind_index` (SHA-256 of the key, indexed) and the single matching row is then verified
/// against `key_hash` (Argon2id, salted), so authentication cost doesn't depend on how many
/// keys exist.
///
/// Keys are soft-revoked: `revoked_at` is set and the row stays for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Argon2id hash in PHC string format
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// `hex(SHA256(plaintext_key))`
    #[serde(skip_serializing)]
    pub blind_index: String,
    /// First characters of the plaintext key, for display only (e.g. `ob_1a2b3c4d`)
    pub key_prefix: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Generates a new plaintext key: `ob_` followed by 64 lowercase hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if the system RNG fails.
    pub fn generate() -> Result<String, AuthError> {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; RANDOM_BYTES];
        rng.fill(&mut bytes).map_err(|_| {
            AuthError::KeyGenerationError("Failed to generate secure random bytes".to_string())
        })?;

        Ok(format!("{API_KEY_PREFIX}{}", hex::encode(bytes)))
    }

    /// Cheap structural check, run before any hashing or database work.
    #[must_use]
    pub fn is_valid_format(key: &str) -> bool {
        if key.len() != KEY_LENGTH {
            return false;
        }

        let Some(random_part) = key.strip_prefix(API_KEY_PREFIX) else {
            return false;
        };

        random_part.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// SHA-256 blind index, hex-encoded.
    ///
    /// A fast hash is fine here: keys carry 256 bits of entropy, so the index can't be brute
    /// forced. Argon2id verification after the lookup is what protects a leaked table.
    #[must_use]
    pub fn compute_blind_index(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Display-only prefix of a plaintext key.
    #[must_use]
    pub fn display_prefix(key: &str) -> String {
        key.chars().take(DISPLAY_PREFIX_LENGTH).collect()
    }

    /// Hashes a key with Argon2id (m=64MB, t=3, p=4) and a random 16-byte salt.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if salting or hashing fails.
    pub fn hash_key(key: &str) -> Result<String, AuthError> {
        let params = Params::new(65536, 3, 4, Some(32)).map_err(|e| {
            AuthError::KeyGenerationError(format!("Failed to create Argon2 params: {e}"))
        })?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let rng = SystemRandom::new();
        let mut salt_bytes = [0u8; 16];
        rng.fill(&mut salt_bytes)
            .map_err(|_| AuthError::KeyGenerationError("Failed to generate salt".to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| {
            AuthError::KeyGenerationError(format!("Failed to create salt string: {e}"))
        })?;

        let hash = argon2
            .hash_password(key.as_bytes(), &salt)
            .map_err(|e| AuthError::KeyGenerationError(format!("Failed to hash API key: {e}")))?;

        Ok(hash.to_string())
    }

    /// Verifies a key against a stored PHC hash. Parameters come from the hash itself.
    #[must_use]
    pub fn verify_key(key: &str, hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };

        Argon2::default().verify_password(key.as_bytes(), &parsed_hash).is_ok()
    }

    /// [`verify_key`](Self::verify_key) on the blocking pool, so Argon2 never runs on an async
    /// worker thread.
    pub async fn verify_key_blocking(key: String, hash: String) -> bool {
        match tokio::task::spawn_blocking(move || Self::verify_key(&key, &hash)).await {
            Ok(verified) => verified,
            Err(e) => {
                tracing::error!(error = %e, "API key verification task failed");
                false
            }
        }
    }

    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Row about to be inserted; the id and timestamps are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: i64,
    pub key_hash: String,
    pub blind_index: String,
    pub key_prefix: String,
    pub name: String,
}

impl NewApiKey {
    /// Hashes a freshly generated plaintext key into a storable row.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if hashing fails.
    pub fn from_plaintext(user_id: i64, name: &str, plaintext: &str) -> Result<Self, AuthError> {
        Ok(Self {
            user_id,
            key_hash: ApiKey::hash_key(plaintext)?,
            blind_index: ApiKey::compute_blind_index(plaintext),
            key_prefix: ApiKey::display_prefix(plaintext),
            name: name.to_string(),
        })
    }
}
