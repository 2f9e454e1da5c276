use crate::auth::AuthError;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};

/// Account row. The table belongs to the account service; the credential engine only reads
/// it to log users in and to put usernames into access tokens.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Hashes a login password with Argon2id default parameters.
///
/// # Errors
///
/// Returns [`AuthError::KeyGenerationError`] if salting or hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let rng = SystemRandom::new();
    let mut salt_bytes = [0u8; 16];
    rng.fill(&mut salt_bytes)
        .map_err(|_| AuthError::KeyGenerationError("Failed to generate salt".to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::KeyGenerationError(format!("Failed to create salt string: {e}")))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::KeyGenerationError(format!("Failed to hash password: {e}")))
}

/// Argon2id PHC string with the same parameters as [`hash_password`] that matches no password.
const UNKNOWN_USER_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok()
}

/// Checks a login attempt on the blocking pool and returns the user if the password matches.
///
/// An unknown user (`None`) is verified against a placeholder hash, so a missing account
/// costs the same Argon2 work as a wrong password.
pub async fn authenticate_password(user: Option<User>, password: String) -> Option<User> {
    let outcome = tokio::task::spawn_blocking(move || {
        let hash = user.as_ref().map_or(UNKNOWN_USER_HASH, |u| u.password_hash.as_str());
        let verified = verify_password(&password, hash);
        user.filter(|_| verified)
    })
    .await;

    outcome.unwrap_or_else(|e| {
        tracing::error!(error = %e, "password verification task failed");
        None
    })
}
