use crate::auth::AuthError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User id
    pub id: i64,
    pub username: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    /// Issued-at, seconds since the Unix epoch
    pub iat: i64,
}

/// Mints and verifies short-lived, stateless bearer tokens.
///
/// Tokens are HS256 JWTs signed with a process-wide secret. Nothing is persisted, so a token
/// stays valid until it expires; keep the TTL short and rely on refresh-token rotation for
/// long sessions.
pub struct AccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl AccessTokenIssuer {
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if the secret is empty.
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::ConfigError("access token secret must not be empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a token for `user_id` expiring `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if encoding fails.
    pub fn sign(&self, user_id: i64, username: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            id: user_id,
            username: username.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::KeyGenerationError(format!("Failed to sign access token: {e}")))
    }

    /// Verifies signature and expiry and returns the claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for any malformed, tampered or expired token.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "access token rejected");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> AccessTokenIssuer {
        AccessTokenIssuer::new("test-secret-do-not-use", Duration::minutes(15))
            .expect("Issuer should build")
    }

    #[test]
    fn test_sign_and_verify() {
        let issuer = issuer();
        let token = issuer.sign(42, "alice").expect("Signing should succeed");

        let claims = issuer.verify(&token).expect("Token should verify");
        assert_eq!(claims.id, 42);
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat, "Expiry should be after issue time");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = AccessTokenIssuer::new("", Duration::minutes(15));
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = AccessTokenIssuer::new("test-secret-do-not-use", Duration::seconds(-30))
            .expect("Issuer should build");
        let token = issuer.sign(1, "bob").expect("Signing should succeed");

        assert!(matches!(issuer.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issuer().sign(1, "bob").expect("Signing should succeed");
        let other = AccessTokenIssuer::new("another-secret", Duration::minutes(15))
            .expect("Issuer should build");

        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let issuer = issuer();
        let token = issuer.sign(1, "bob").expect("Signing should succeed");

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = issuer.sign(2, "mallory").expect("Signing should succeed");
        let forged_parts: Vec<&str> = forged_payload.split('.').collect();
        parts[1] = forged_parts[1];
        let tampered = parts.join(".");

        assert!(matches!(issuer.verify(&tampered), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = issuer();
        assert!(issuer.verify("").is_err());
        assert!(issuer.verify("not.a.jwt").is_err());
        assert!(issuer.verify("ob_0123").is_err());
    }
}
