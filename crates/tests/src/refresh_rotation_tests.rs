//! Refresh token rotation against `SQLite`.
//!
//! Covers the rotation chain, replay of a rotated token, concurrent rotation of the same
//! token through a pooled on-disk database, and the exact expiry boundary.

use crate::test_helpers::{file_repository, memory_repository};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tollgate_core::auth::refresh_token::{RefreshTokenStore, Rotation};

fn store_for(repo: Arc<tollgate_core::auth::repository::SqliteRepository>) -> RefreshTokenStore {
    RefreshTokenStore::new(repo, Duration::days(30), Duration::days(7))
}

#[tokio::test]
async fn test_rotation_chain_keeps_family() {
    let store = store_for(memory_repository().await);
    let issued = store.create(1).await.unwrap();

    let mut current = issued.raw_token.clone();
    let mut seen = vec![current.clone()];
    for _ in 0..3 {
        let rotated = store.rotate(&current).await.unwrap().into_rotated().unwrap();
        assert_eq!(rotated.family_id, issued.family_id);
        assert_eq!(rotated.user_id, 1);
        assert!(!seen.contains(&rotated.raw_token));
        seen.push(rotated.raw_token.clone());
        current = rotated.raw_token;
    }

    // Presenting the first token again revokes the whole family, latest member included
    assert!(matches!(store.rotate(&issued.raw_token).await.unwrap(), Rotation::Replayed));
    assert!(matches!(store.rotate(&current).await.unwrap(), Rotation::Replayed));
}

#[tokio::test]
async fn test_replay_does_not_touch_other_families() {
    let store = store_for(memory_repository().await);
    let laptop = store.create(1).await.unwrap();
    let phone = store.create(1).await.unwrap();

    store.rotate(&laptop.raw_token).await.unwrap().into_rotated().unwrap();
    assert!(matches!(store.rotate(&laptop.raw_token).await.unwrap(), Rotation::Replayed));

    assert!(store.rotate(&phone.raw_token).await.unwrap().into_rotated().is_some());
}

#[tokio::test]
async fn test_unknown_and_malformed_tokens() {
    let store = store_for(memory_repository().await);

    assert!(matches!(store.rotate("not-a-token").await.unwrap(), Rotation::NotFound));
    assert!(matches!(store.rotate(&"ab".repeat(32)).await.unwrap(), Rotation::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotation_has_single_winner() {
    let (_dir, repo) = file_repository().await;
    let store = Arc::new(store_for(repo));
    let issued = store.create(7).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let raw = issued.raw_token.clone();
        handles.push(tokio::spawn(async move { store.rotate(&raw).await.unwrap() }));
    }

    let mut winners = Vec::new();
    let mut replays = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Rotation::Rotated(rotated) => winners.push(rotated),
            Rotation::Replayed => replays += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(replays, 7);

    // The losers saw a replay, so the winner's successor is dead as well
    assert!(matches!(store.rotate(&winners[0].raw_token).await.unwrap(), Rotation::Replayed));
}

#[tokio::test]
async fn test_expiry_boundary() {
    let store = store_for(memory_repository().await);
    let issued_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let expires_at = issued_at + Duration::days(30);

    let before = store.create_at(1, issued_at).await.unwrap();
    assert_eq!(before.expires_at, expires_at);
    let rotation = store.rotate_at(&before.raw_token, expires_at - Duration::milliseconds(1)).await.unwrap();
    assert!(matches!(rotation, Rotation::Rotated(_)));

    let exactly = store.create_at(1, issued_at).await.unwrap();
    assert!(matches!(store.rotate_at(&exactly.raw_token, expires_at).await.unwrap(), Rotation::Expired));

    let after = store.create_at(1, issued_at).await.unwrap();
    let rotation = store.rotate_at(&after.raw_token, expires_at + Duration::milliseconds(1)).await.unwrap();
    assert!(matches!(rotation, Rotation::Expired));

    // An expired token is revoked when presented, so a second attempt counts as replay
    assert!(matches!(
        store.rotate_at(&after.raw_token, expires_at + Duration::milliseconds(2)).await.unwrap(),
        Rotation::Replayed
    ));
}

#[tokio::test]
async fn test_revoke_all_and_purge() {
    let store = store_for(memory_repository().await);
    let now = Utc::now();

    let a = store.create(1).await.unwrap();
    let b = store.create(1).await.unwrap();
    let other = store.create(2).await.unwrap();

    assert_eq!(store.revoke_all(1).await.unwrap(), 2);
    assert!(store.rotate(&a.raw_token).await.unwrap().into_rotated().is_none());
    assert!(store.rotate(&b.raw_token).await.unwrap().into_rotated().is_none());
    assert!(store.rotate(&other.raw_token).await.unwrap().into_rotated().is_some());

    // Rows expired for longer than the retention window are deleted
    let old = store.create_at(3, now - Duration::days(40)).await.unwrap();
    let deleted = store.purge_expired_at(now).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(matches!(store.rotate(&old.raw_token).await.unwrap(), Rotation::NotFound));
}
