//! Legacy envelope migration against `SQLite`.

use crate::test_helpers::memory_repository;
use std::{sync::Arc, time::Duration};
use tollgate_core::{
    auth::repository::SecretRepository,
    crypto::{
        cipher::{CredentialCipher, KeyDerivation, CURRENT_MARKER, LEGACY_MARKER},
        secrets::ProviderSecrets,
    },
};

const KEY: &str = "integration-test-encryption-key";

fn marker_of(value: &str) -> &str {
    value.split_once(':').map_or("", |(marker, _)| marker)
}

#[tokio::test]
async fn test_legacy_envelope_upgraded_on_read() {
    let repo = memory_repository().await;
    let cipher = Arc::new(CredentialCipher::new(Some(KEY)).unwrap());
    let legacy = cipher.encrypt_with(KeyDerivation::LegacySha256, "sk-legacy-9876").unwrap();
    assert_eq!(marker_of(&legacy), LEGACY_MARKER);
    repo.put(1, "openai", &legacy).await.unwrap();

    let secrets = ProviderSecrets::new(repo.clone(), cipher);
    assert_eq!(secrets.reveal(1, "openai").await.unwrap().as_deref(), Some("sk-legacy-9876"));

    // Write-back happens on a detached task
    let mut persisted = None;
    for _ in 0..100 {
        let stored = repo.get(1, "openai").await.unwrap().unwrap();
        if marker_of(&stored) == CURRENT_MARKER {
            persisted = Some(stored);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let persisted = persisted.expect("upgraded envelope was not persisted");

    assert_ne!(persisted, legacy);
    assert_eq!(secrets.reveal(1, "openai").await.unwrap().as_deref(), Some("sk-legacy-9876"));
}

#[tokio::test]
async fn test_bulk_upgrade() {
    let repo = memory_repository().await;
    let cipher = Arc::new(CredentialCipher::new(Some(KEY)).unwrap());

    repo.put(1, "legacy-a", &cipher.encrypt_with(KeyDerivation::LegacySha256, "a-secret").unwrap())
        .await
        .unwrap();
    repo.put(2, "legacy-b", &cipher.encrypt_with(KeyDerivation::LegacySha256, "b-secret").unwrap())
        .await
        .unwrap();
    repo.put(1, "current", &cipher.encrypt("c-secret").unwrap()).await.unwrap();

    let secrets = ProviderSecrets::new(repo.clone(), cipher.clone());
    assert_eq!(secrets.upgrade_all().await.unwrap(), 2);

    for stored in repo.list_all().await.unwrap() {
        assert_eq!(marker_of(&stored.value), CURRENT_MARKER, "{} not upgraded", stored.provider);
    }
    assert_eq!(secrets.reveal(2, "legacy-b").await.unwrap().as_deref(), Some("b-secret"));

    // Nothing left to do
    assert_eq!(secrets.upgrade_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_wrong_key_cannot_read() {
    let repo = memory_repository().await;
    let writer = ProviderSecrets::new(repo.clone(), Arc::new(CredentialCipher::new(Some(KEY)).unwrap()));
    writer.store(1, "anthropic", "sk-ant-0000").await.unwrap();

    let reader =
        ProviderSecrets::new(repo, Arc::new(CredentialCipher::new(Some("a-different-key")).unwrap()));
    assert!(reader.reveal(1, "anthropic").await.is_err());
}
