use super::cipher::{is_masked, mask_for_display, CredentialCipher, Decrypted};
use crate::auth::{repository::SecretRepository, AuthError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Raw `provider_secrets` row. `value` is an envelope, or plaintext in key-less deployments.
#[derive(Debug, Clone)]
pub struct StoredSecret {
    pub owner_id: i64,
    pub provider: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-owner, per-provider third-party secrets, encrypted at rest.
///
/// Reads transparently migrate envelopes written under an older key derivation: the
/// re-encrypted value is written back on a detached task, and only if the row hasn't
/// changed in the meantime. A failed write-back is logged and retried on the next read.
pub struct ProviderSecrets {
    repository: Arc<dyn SecretRepository>,
    cipher: Arc<CredentialCipher>,
}

impl ProviderSecrets {
    pub fn new(repository: Arc<dyn SecretRepository>, cipher: Arc<CredentialCipher>) -> Self {
        Self { repository, cipher }
    }

    /// Encrypts and stores a secret, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the write fails.
    pub async fn store(&self, owner_id: i64, provider: &str, plaintext: &str) -> Result<(), AuthError> {
        let envelope = self.cipher.encrypt(plaintext)?;
        self.repository.put(owner_id, provider, &envelope).await?;
        tracing::info!(owner_id, provider, "provider secret stored");
        Ok(())
    }

    /// Decrypts the stored secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DecryptionFailed`] if the stored value can't be authenticated.
    pub async fn reveal(&self, owner_id: i64, provider: &str) -> Result<Option<String>, AuthError> {
        let Some(stored) = self.repository.get(owner_id, provider).await? else {
            return Ok(None);
        };

        let Decrypted { plaintext, upgraded } = self.cipher.decrypt(&stored)?;
        if let Some(upgraded) = upgraded {
            self.spawn_persist_upgrade(owner_id, provider, stored, upgraded);
        }

        Ok(Some(plaintext))
    }

    /// Display-safe form of the stored secret.
    ///
    /// # Errors
    ///
    /// Same as [`reveal`](Self::reveal).
    pub async fn masked(&self, owner_id: i64, provider: &str) -> Result<Option<String>, AuthError> {
        Ok(self.reveal(owner_id, provider).await?.map(|s| mask_for_display(&s)))
    }

    /// Returns the real secret when `candidate` is a masked echo of it.
    ///
    /// Forms that round-trip a masked value back to the server would otherwise overwrite the
    /// stored secret with `****1234`. Non-masked candidates are returned unchanged. A masked
    /// candidate must equal the stored secret's mask exactly.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotConfigured`] if `candidate` is masked but nothing is stored, and
    /// [`AuthError::MaskMismatch`] if it is not the mask of the stored secret.
    pub async fn resolve_if_masked(
        &self,
        candidate: &str,
        owner_id: i64,
        provider: &str,
    ) -> Result<String, AuthError> {
        if !is_masked(candidate) {
            return Ok(candidate.to_string());
        }

        let stored = self.reveal(owner_id, provider).await?.ok_or(AuthError::NotConfigured)?;
        if mask_for_display(&stored) == candidate {
            Ok(stored)
        } else {
            tracing::warn!(owner_id, provider, "masked value does not match stored secret");
            Err(AuthError::MaskMismatch)
        }
    }

    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if the delete fails.
    pub async fn remove(&self, owner_id: i64, provider: &str) -> Result<bool, AuthError> {
        self.repository.delete(owner_id, provider).await
    }

    /// Eagerly re-encrypts every stored secret that isn't under the current derivation.
    ///
    /// Rows that fail to decrypt are logged and skipped. Returns the number upgraded.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageError`] if listing or writing fails.
    pub async fn upgrade_all(&self) -> Result<usize, AuthError> {
        let mut upgraded_count = 0;

        for secret in self.repository.list_all().await? {
            let upgraded = match self.cipher.decrypt(&secret.value) {
                Ok(Decrypted { upgraded: Some(upgraded), .. }) => upgraded,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(
                        owner_id = secret.owner_id,
                        provider = %secret.provider,
                        error = %e,
                        "skipping secret that failed to decrypt"
                    );
                    continue;
                }
            };

            if self
                .repository
                .replace_if_unchanged(secret.owner_id, &secret.provider, &secret.value, &upgraded)
                .await?
            {
                upgraded_count += 1;
            }
        }

        tracing::info!(upgraded = upgraded_count, "provider secret upgrade finished");
        Ok(upgraded_count)
    }

    fn spawn_persist_upgrade(&self, owner_id: i64, provider: &str, previous: String, upgraded: String) {
        let repository = self.repository.clone();
        let provider = provider.to_string();

        tokio::spawn(async move {
            match repository.replace_if_unchanged(owner_id, &provider, &previous, &upgraded).await {
                Ok(true) => tracing::info!(owner_id, provider = %provider, "provider secret re-encrypted"),
                Ok(false) => {
                    tracing::debug!(owner_id, provider = %provider, "secret changed before upgrade, skipped");
                }
                Err(e) => tracing::warn!(
                    owner_id,
                    provider = %provider,
                    error = %e,
                    "failed to persist re-encrypted secret, will retry on next read"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::KeyDerivation;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };
    use tokio::sync::Mutex;

    struct MockRepository {
        rows: Mutex<HashMap<(i64, String), String>>,
        fail_replace: AtomicBool,
    }

    impl MockRepository {
        fn new() -> Self {
            Self { rows: Mutex::new(HashMap::new()), fail_replace: AtomicBool::new(false) }
        }

        async fn raw(&self, owner_id: i64, provider: &str) -> Option<String> {
            self.rows.lock().await.get(&(owner_id, provider.to_string())).cloned()
        }
    }

    #[async_trait]
    impl SecretRepository for MockRepository {
        async fn get(&self, owner_id: i64, provider: &str) -> Result<Option<String>, AuthError> {
            Ok(self.raw(owner_id, provider).await)
        }

        async fn put(&self, owner_id: i64, provider: &str, value: &str) -> Result<(), AuthError> {
            self.rows.lock().await.insert((owner_id, provider.to_string()), value.to_string());
            Ok(())
        }

        async fn replace_if_unchanged(
            &self,
            owner_id: i64,
            provider: &str,
            expected: &str,
            value: &str,
        ) -> Result<bool, AuthError> {
            if self.fail_replace.load(Ordering::SeqCst) {
                return Err(AuthError::StorageError("database is locked".to_string()));
            }
            let mut rows = self.rows.lock().await;
            match rows.get_mut(&(owner_id, provider.to_string())) {
                Some(current) if current == expected => {
                    *current = value.to_string();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn delete(&self, owner_id: i64, provider: &str) -> Result<bool, AuthError> {
            Ok(self.rows.lock().await.remove(&(owner_id, provider.to_string())).is_some())
        }

        async fn list_all(&self) -> Result<Vec<StoredSecret>, AuthError> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .map(|((owner_id, provider), value)| StoredSecret {
                    owner_id: *owner_id,
                    provider: provider.clone(),
                    value: value.clone(),
                    updated_at: Utc::now(),
                })
                .collect())
        }
    }

    fn setup() -> (Arc<MockRepository>, Arc<CredentialCipher>, ProviderSecrets) {
        let repo = Arc::new(MockRepository::new());
        let cipher = Arc::new(CredentialCipher::new(Some("secrets-test-key")).expect("Cipher"));
        let secrets = ProviderSecrets::new(repo.clone(), cipher.clone());
        (repo, cipher, secrets)
    }

    async fn wait_for_marker(repo: &MockRepository, owner_id: i64, provider: &str, marker: &str) -> bool {
        let prefix = format!("{marker}:");
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if repo.raw(owner_id, provider).await.is_some_and(|v| v.starts_with(&prefix)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn test_store_encrypts_at_rest() {
        let (repo, _cipher, secrets) = setup();

        secrets.store(1, "openai", "sk_openbin_abcd1234").await.expect("Store should succeed");

        let raw = repo.raw(1, "openai").await.expect("Row should exist");
        assert!(raw.starts_with("enc2:"));
        assert!(!raw.contains("sk_openbin"));

        let revealed = secrets.reveal(1, "openai").await.expect("Reveal should succeed");
        assert_eq!(revealed.as_deref(), Some("sk_openbin_abcd1234"));
        let masked = secrets.masked(1, "openai").await.expect("Masked should succeed");
        assert_eq!(masked.as_deref(), Some("****1234"));
    }

    #[tokio::test]
    async fn test_reveal_missing() {
        let (_repo, _cipher, secrets) = setup();
        assert!(secrets.reveal(1, "openai").await.expect("Reveal should succeed").is_none());
    }

    #[tokio::test]
    async fn test_legacy_envelope_upgraded_on_read() {
        let (repo, cipher, secrets) = setup();
        let legacy = cipher
            .encrypt_with(KeyDerivation::LegacySha256, "sk_legacy_9876")
            .expect("Encrypt should succeed");
        repo.put(3, "anthropic", &legacy).await.expect("Put should succeed");

        let revealed = secrets.reveal(3, "anthropic").await.expect("Reveal should succeed");
        assert_eq!(revealed.as_deref(), Some("sk_legacy_9876"));

        assert!(wait_for_marker(&repo, 3, "anthropic", "enc2").await, "Upgrade should persist");
        let revealed = secrets.reveal(3, "anthropic").await.expect("Reveal should succeed");
        assert_eq!(revealed.as_deref(), Some("sk_legacy_9876"));
    }

    #[tokio::test]
    async fn test_failed_upgrade_does_not_fail_read() {
        let (repo, cipher, secrets) = setup();
        repo.fail_replace.store(true, Ordering::SeqCst);
        let legacy = cipher
            .encrypt_with(KeyDerivation::LegacySha256, "sk_legacy_9876")
            .expect("Encrypt should succeed");
        repo.put(3, "anthropic", &legacy).await.expect("Put should succeed");

        let revealed = secrets.reveal(3, "anthropic").await.expect("Read should still succeed");
        assert_eq!(revealed.as_deref(), Some("sk_legacy_9876"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(repo.raw(3, "anthropic").await.as_deref(), Some(legacy.as_str()));
    }

    #[tokio::test]
    async fn test_resolve_if_masked() {
        let (_repo, _cipher, secrets) = setup();

        let passthrough = secrets.resolve_if_masked("sk_new_value", 1, "openai").await;
        assert_eq!(passthrough.expect("Non-masked value passes through"), "sk_new_value");

        let missing = secrets.resolve_if_masked("****1234", 1, "openai").await;
        assert!(matches!(missing, Err(AuthError::NotConfigured)));

        secrets.store(1, "openai", "sk_openbin_abcd1234").await.expect("Store should succeed");
        let resolved = secrets.resolve_if_masked("****1234", 1, "openai").await;
        assert_eq!(resolved.expect("Masked value resolves"), "sk_openbin_abcd1234");
    }

    #[tokio::test]
    async fn test_resolve_rejects_foreign_mask() {
        let (_repo, _cipher, secrets) = setup();
        secrets.store(1, "openai", "sk_openbin_abcd1234").await.expect("Store should succeed");

        for candidate in ["****9999", "****", "********1234", "****x"] {
            let result = secrets.resolve_if_masked(candidate, 1, "openai").await;
            assert!(matches!(result, Err(AuthError::MaskMismatch)), "{candidate} should be rejected");
        }

        let revealed = secrets.reveal(1, "openai").await.expect("Reveal should succeed");
        assert_eq!(revealed.as_deref(), Some("sk_openbin_abcd1234"));
    }

    #[tokio::test]
    async fn test_upgrade_all() {
        let (repo, cipher, secrets) = setup();
        let legacy = cipher.encrypt_with(KeyDerivation::LegacySha256, "a-secret").expect("Encrypt");
        repo.put(1, "legacy", &legacy).await.expect("Put");
        secrets.store(1, "current", "b-secret").await.expect("Store");
        repo.put(1, "plain", "c-secret").await.expect("Put");
        repo.put(1, "corrupt", "enc2:00:00:00").await.expect("Put");

        let upgraded = secrets.upgrade_all().await.expect("Upgrade should succeed");
        assert_eq!(upgraded, 1);
        assert!(repo.raw(1, "legacy").await.expect("Row").starts_with("enc2:"));
        assert_eq!(repo.raw(1, "plain").await.as_deref(), Some("c-secret"));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_repo, _cipher, secrets) = setup();
        secrets.store(1, "openai", "sk").await.expect("Store should succeed");
        assert!(secrets.remove(1, "openai").await.expect("Remove should succeed"));
        assert!(secrets.reveal(1, "openai").await.expect("Reveal should succeed").is_none());
    }
}
