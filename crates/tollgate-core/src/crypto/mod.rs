//! Encryption at rest for third-party provider secrets.
//!
//! [`cipher::CredentialCipher`] seals values in self-describing AES-256-GCM envelopes and can
//! still open envelopes written under an older key derivation. [`secrets::ProviderSecrets`]
//! sits on top of the secret repository and migrates those older envelopes as they are read.

pub mod cipher;
pub mod secrets;
