//! Per-user API key quota against `SQLite`.

use crate::test_helpers::{file_repository, memory_repository};
use std::sync::Arc;
use tollgate_core::{auth::AuthError, middleware::ApiKeyAuthenticator};

#[tokio::test]
async fn test_quota_then_revoke_frees_slot() {
    let authenticator = ApiKeyAuthenticator::new(memory_repository().await, 2);

    let first = authenticator.create(1, "first").await.unwrap();
    authenticator.create(1, "second").await.unwrap();

    let err = authenticator.create(1, "third").await.unwrap_err();
    assert!(matches!(err, AuthError::LimitExceeded { limit: 2 }));

    // Quota is per user
    authenticator.create(2, "other-user").await.unwrap();

    authenticator.revoke(1, first.api_key.id).await.unwrap();
    authenticator.create(1, "third").await.unwrap();

    let keys = authenticator.list(1).await.unwrap();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys.iter().filter(|k| !k.is_revoked()).count(), 2);
}

#[tokio::test]
async fn test_revoked_key_stops_authenticating() {
    let authenticator = ApiKeyAuthenticator::new(memory_repository().await, 5);
    let created = authenticator.create(4, "ci").await.unwrap();

    let authenticated = authenticator.authenticate(&created.raw_key).await.unwrap();
    assert_eq!(authenticated.user_id, 4);
    assert_eq!(authenticated.key_id, created.api_key.id);

    authenticator.revoke(4, created.api_key.id).await.unwrap();
    assert!(matches!(authenticator.authenticate(&created.raw_key).await, Err(AuthError::InvalidKey)));
}

#[tokio::test]
async fn test_cannot_revoke_another_users_key() {
    let authenticator = ApiKeyAuthenticator::new(memory_repository().await, 5);
    let created = authenticator.create(1, "mine").await.unwrap();

    assert!(matches!(authenticator.revoke(2, created.api_key.id).await, Err(AuthError::InvalidKey)));
    assert!(authenticator.authenticate(&created.raw_key).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_respects_quota() {
    let (_dir, repo) = file_repository().await;
    let authenticator = Arc::new(ApiKeyAuthenticator::new(repo, 3));

    let mut handles = Vec::new();
    for i in 0..6 {
        let authenticator = authenticator.clone();
        handles.push(tokio::spawn(async move { authenticator.create(9, &format!("key-{i}")).await }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AuthError::LimitExceeded { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 3);
    assert_eq!(rejected, 3);
    assert_eq!(authenticator.list(9).await.unwrap().len(), 3);
}
