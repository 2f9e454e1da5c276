//! Authenticated encryption of provider secrets with versioned key derivation.
//!
//! # Envelope
//!
//! ```text
//! <marker>:<iv hex>:<auth tag hex>:<ciphertext hex>
//! ```
//!
//! AES-256-GCM with a random 12-byte IV and a detached 16-byte tag. The marker names the
//! key derivation used when the envelope was written:
//!
//! | marker | derivation                                   |
//! |--------|----------------------------------------------|
//! | `enc2` | Argon2id(secret, application salt), current  |
//! | `enc`  | SHA-256(secret), legacy                      |
//!
//! Strings without a marker are legacy plaintext and pass through untouched. With no key
//! configured, encryption is a passthrough too.
//!
//! # Migration
//!
//! Decryption tries the derivations in order, current first. When only the legacy one
//! authenticates, [`Decrypted::upgraded`] carries a fresh current-scheme envelope for the
//! caller to persist.

use crate::auth::AuthError;
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use argon2::{Algorithm, Argon2, Params, Version};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::fmt;

pub const CURRENT_MARKER: &str = "enc2";
pub const LEGACY_MARKER: &str = "enc";

/// Mask shown in place of everything but the last characters of a secret.
pub const MASK: &str = "****";
const VISIBLE_SUFFIX: usize = 4;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const KDF_SALT: &[u8] = b"tollgate/provider-secrets/v2";

/// Key derivation schemes, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivation {
    /// Argon2id, m=19456 KiB, t=2, p=1, fixed application salt
    Argon2id,
    /// Single SHA-256 of the secret
    LegacySha256,
}

impl KeyDerivation {
    /// Order in which decryption attempts are made.
    pub const ORDERED: [Self; 2] = [Self::Argon2id, Self::LegacySha256];

    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Argon2id => CURRENT_MARKER,
            Self::LegacySha256 => LEGACY_MARKER,
        }
    }

    #[must_use]
    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ORDERED.into_iter().find(|d| d.marker() == marker)
    }

    fn derive(self, secret: &str) -> Result<[u8; KEY_LEN], AuthError> {
        let mut key = [0u8; KEY_LEN];
        match self {
            Self::Argon2id => {
                let params = Params::new(19456, 2, 1, Some(KEY_LEN)).map_err(|e| {
                    AuthError::ConfigError(format!("Failed to create Argon2 params: {e}"))
                })?;
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                    .hash_password_into(secret.as_bytes(), KDF_SALT, &mut key)
                    .map_err(|e| {
                        AuthError::ConfigError(format!("Failed to derive encryption key: {e}"))
                    })?;
            }
            Self::LegacySha256 => {
                key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
            }
        }
        Ok(key)
    }
}

impl fmt::Display for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

struct DerivedKey {
    derivation: KeyDerivation,
    cipher: Aes256Gcm,
}

impl DerivedKey {
    fn new(derivation: KeyDerivation, secret: &str) -> Result<Self, AuthError> {
        let key = derivation.derive(secret)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AuthError::ConfigError(format!("Invalid encryption key length: {e}")))?;
        Ok(Self { derivation, cipher })
    }

    fn seal(&self, plaintext: &str) -> Result<String, AuthError> {
        let mut iv = [0u8; IV_LEN];
        SystemRandom::new()
            .fill(&mut iv)
            .map_err(|_| AuthError::KeyGenerationError("Failed to generate IV".to_string()))?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| AuthError::KeyGenerationError("Encryption failed".to_string()))?;

        Ok(format!(
            "{}:{}:{}:{}",
            self.derivation.marker(),
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// `None` means the tag didn't authenticate under this key.
    fn open(&self, envelope: &Envelope) -> Option<Vec<u8>> {
        let mut buffer = envelope.ciphertext.clone();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&envelope.iv),
                b"",
                &mut buffer,
                Tag::from_slice(&envelope.tag),
            )
            .ok()
            .map(|()| buffer)
    }
}

/// Parsed envelope fields.
struct Envelope {
    derivation: KeyDerivation,
    iv: Vec<u8>,
    tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    fn parse(input: &str) -> Result<Self, AuthError> {
        let mut parts = input.split(':');
        let (Some(marker), Some(iv), Some(tag), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::DecryptionFailed("malformed envelope".to_string()));
        };

        let derivation = KeyDerivation::from_marker(marker)
            .ok_or_else(|| AuthError::DecryptionFailed("unknown envelope marker".to_string()))?;
        let iv = decode_field(iv, "iv")?;
        let tag = decode_field(tag, "auth tag")?;
        let ciphertext = decode_field(ciphertext, "ciphertext")?;

        if iv.len() != IV_LEN {
            return Err(AuthError::DecryptionFailed(format!("iv must be {IV_LEN} bytes")));
        }
        if tag.len() != TAG_LEN {
            return Err(AuthError::DecryptionFailed(format!("auth tag must be {TAG_LEN} bytes")));
        }

        Ok(Self { derivation, iv, tag, ciphertext })
    }
}

fn decode_field(field: &str, name: &str) -> Result<Vec<u8>, AuthError> {
    hex::decode(field).map_err(|e| AuthError::DecryptionFailed(format!("invalid {name} hex: {e}")))
}

/// Result of a successful [`CredentialCipher::decrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: String,
    /// Re-encryption under the current derivation, present when the input used an older one.
    pub upgraded: Option<String>,
}

/// Encrypts and decrypts provider secrets.
///
/// Keys for every derivation are computed once at construction.
pub struct CredentialCipher {
    /// Ordered as [`KeyDerivation::ORDERED`]; `None` when no secret is configured.
    keys: Option<Vec<DerivedKey>>,
}

impl CredentialCipher {
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if key derivation fails.
    pub fn new(secret: Option<&str>) -> Result<Self, AuthError> {
        let Some(secret) = secret.filter(|s| !s.is_empty()) else {
            tracing::warn!("no encryption key configured, provider secrets are stored in plaintext");
            return Ok(Self::passthrough());
        };

        let keys = KeyDerivation::ORDERED
            .into_iter()
            .map(|derivation| DerivedKey::new(derivation, secret))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { keys: Some(keys) })
    }

    /// Cipher for key-less deployments: encryption returns the plaintext.
    #[must_use]
    pub fn passthrough() -> Self {
        Self { keys: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.keys.is_some()
    }

    /// Whether `input` looks like an envelope (starts with a known marker).
    #[must_use]
    pub fn is_envelope(input: &str) -> bool {
        input
            .split_once(':')
            .is_some_and(|(marker, _)| KeyDerivation::from_marker(marker).is_some())
    }

    /// Encrypts under the current derivation, or returns `plaintext` unchanged without a key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if IV generation or sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuthError> {
        self.encrypt_with(KeyDerivation::Argon2id, plaintext)
    }

    /// Encrypts under a specific derivation. Only useful for producing legacy fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGenerationError`] if IV generation or sealing fails.
    pub fn encrypt_with(
        &self,
        derivation: KeyDerivation,
        plaintext: &str,
    ) -> Result<String, AuthError> {
        match self.key_for(derivation) {
            Some(key) => key.seal(plaintext),
            None => Ok(plaintext.to_string()),
        }
    }

    fn key_for(&self, derivation: KeyDerivation) -> Option<&DerivedKey> {
        self.keys.as_ref()?.iter().find(|k| k.derivation == derivation)
    }

    /// Decrypts an envelope, or returns unmarked input as-is.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DecryptionFailed`] if the envelope is malformed, no key is
    /// configured, or no derivation authenticates it.
    pub fn decrypt(&self, input: &str) -> Result<Decrypted, AuthError> {
        if !Self::is_envelope(input) {
            return Ok(Decrypted { plaintext: input.to_string(), upgraded: None });
        }

        let envelope = Envelope::parse(input)?;
        let keys = self.keys.as_ref().ok_or_else(|| {
            AuthError::DecryptionFailed("envelope present but no encryption key configured".to_string())
        })?;

        let Some((key, bytes)) = keys.iter().find_map(|key| key.open(&envelope).map(|b| (key, b)))
        else {
            return Err(AuthError::DecryptionFailed(
                "authentication failed under every key derivation".to_string(),
            ));
        };

        let plaintext = String::from_utf8(bytes)
            .map_err(|_| AuthError::DecryptionFailed("plaintext is not valid UTF-8".to_string()))?;

        let current = KeyDerivation::ORDERED[0];
        let upgraded = if key.derivation == current && envelope.derivation == current {
            None
        } else {
            tracing::debug!(
                envelope = %envelope.derivation,
                opened_with = %key.derivation,
                "secret decrypted with outdated derivation, re-encrypting"
            );
            Some(self.encrypt(&plaintext)?)
        };

        Ok(Decrypted { plaintext, upgraded })
    }
}

/// Display-safe rendering: `****` followed by the last four characters.
///
/// Secrets of four characters or fewer are fully masked.
#[must_use]
pub fn mask_for_display(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= VISIBLE_SUFFIX {
        return MASK.to_string();
    }

    let suffix: String = secret.chars().skip(len - VISIBLE_SUFFIX).collect();
    format!("{MASK}{suffix}")
}

/// Whether a client-supplied value is a masked display string rather than a real secret.
#[must_use]
pub fn is_masked(candidate: &str) -> bool {
    candidate.starts_with(MASK)
}
