//! Credential verification and lifecycle.
//!
//! Three credential types reach the service:
//!
//! - **Access tokens** ([`access_token`]): short-lived HS256 JWTs, verified statelessly.
//! - **Refresh tokens** ([`refresh_token`]): long-lived opaque secrets grouped into rotation
//!   families. Each use rotates the token; presenting a rotated token revokes the family.
//! - **API keys** ([`api_key`]): long-lived opaque `ob_` keys, looked up by blind index and
//!   verified with Argon2id.
//!
//! [`resolver::AuthResolver`] turns whatever a request carries into an [`AuthContext`].
//!
//! # Request Flow
//!
//! ```text
//!   Authorization: Bearer ...   ─┐
//!   Cookie: access_token=...    ─┼──> first present source ──> Credential::classify
//!   ?access_token=...           ─┘                                   │
//!                                                   ┌────────────────┴───────────────┐
//!                                              ob_ prefix                        otherwise
//!                                                   │                                │
//!                                       ApiKeyAuthenticator               AccessTokenIssuer
//!                                     (blind index + Argon2id)            (HS256, no leeway)
//!                                                   │                                │
//!                                                   └──────────> AuthContext <───────┘
//! ```
//!
//! # Storage
//!
//! Persistence goes through the repository traits in [`repository`], implemented for `SQLite`
//! by [`SqliteRepository`](repository::SqliteRepository). Raw secrets are never stored: refresh
//! tokens are kept as SHA-256 digests, API keys as Argon2id PHC strings plus a SHA-256 blind
//! index.
//!
//! # Errors
//!
//! Every operation returns [`Result<T, AuthError>`](AuthError). Authentication failures of any
//! kind collapse to the same public response (see [`AuthError::public_message`]) so callers
//! cannot distinguish an unknown key from a revoked one or a replayed refresh token.

pub mod access_token;
pub mod api_key;
pub mod purge;
pub mod refresh_token;
pub mod repository;
pub mod resolver;
pub mod user;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types for credential issuance, verification and storage.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No usable credential was presented, or the presented one was rejected
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Access token signature, structure or expiry check failed
    #[error("Invalid access token")]
    InvalidToken,

    /// API key is malformed, unknown, or revoked
    #[error("Invalid API key")]
    InvalidKey,

    /// A refresh token that was already rotated has been presented again
    #[error("Refresh token replay detected")]
    ReplayDetected,

    /// The user already holds the maximum number of active API keys
    #[error("API key limit reached ({limit} active keys)")]
    LimitExceeded { limit: u32 },

    /// Envelope is malformed or no derivation could authenticate it
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// API key name is empty, too long, or contains disallowed characters
    #[error("Invalid API key name: {0}")]
    InvalidName(String),

    /// A masked value was echoed back but nothing is stored to resolve it against
    #[error("No stored secret to resolve masked value against")]
    NotConfigured,

    /// A masked value was echoed back that is not the mask of the stored secret
    #[error("Masked value does not match the stored secret")]
    MaskMismatch,

    /// Database operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Credential subsystem configuration is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to generate secure random material or hash a secret
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::StorageError(err.to_string())
    }
}

impl AuthError {
    /// Whether this error means "the caller is not who they claim to be".
    ///
    /// These variants must be indistinguishable on the wire.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::InvalidToken | Self::InvalidKey | Self::ReplayDetected
        )
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated | Self::InvalidToken | Self::InvalidKey | Self::ReplayDetected => {
                401
            }
            Self::InvalidName(_) | Self::MaskMismatch => 400,
            Self::LimitExceeded { .. } => 429,
            Self::NotConfigured => 404,
            Self::DecryptionFailed(_)
            | Self::StorageError(_)
            | Self::ConfigError(_)
            | Self::KeyGenerationError(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        if self.is_authentication_failure() {
            return "unauthenticated";
        }
        match self {
            Self::InvalidName(_) | Self::MaskMismatch => "invalid_request",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::NotConfigured => "not_configured",
            _ => "internal_error",
        }
    }

    /// Message safe to return to clients.
    ///
    /// Internal details (database messages, decryption causes) are never exposed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidName(_)
            | Self::LimitExceeded { .. }
            | Self::NotConfigured
            | Self::MaskMismatch => self.to_string(),
            _ => self.code().to_string(),
        }
    }
}

/// How a request proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Jwt => "jwt",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    /// Present for access tokens (carried in the claims). API-key requests don't load it.
    pub username: Option<String>,
}

/// Result of resolving a request's credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub principal: Principal,
    pub method: AuthMethod,
    /// Database id of the API key used, when `method` is [`AuthMethod::ApiKey`].
    pub api_key_id: Option<i64>,
}

/// API key that passed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedKey {
    pub key_id: i64,
    pub user_id: i64,
}
