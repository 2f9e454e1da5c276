//! Test Helper Functions and Utilities
//!
//! Common fixtures for databases, users and configuration.

use std::sync::Arc;
use tempfile::TempDir;
use tollgate_core::{
    auth::{
        repository::{SqliteRepository, UserDirectory},
        user::{hash_password, User},
    },
    config::AppConfig,
};

pub const TEST_PASSWORD: &str = "correct-horse-battery-staple";

/// Shared in-memory database with the schema applied.
pub async fn memory_repository() -> Arc<SqliteRepository> {
    Arc::new(SqliteRepository::connect_and_migrate("sqlite::memory:").await.unwrap())
}

/// On-disk database with a real connection pool, for tests that need concurrent writers.
///
/// The returned `TempDir` must outlive the repository.
pub async fn file_repository() -> (TempDir, Arc<SqliteRepository>) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("tollgate.db").display());
    let repo = SqliteRepository::connect_and_migrate(&url).await.unwrap();
    (dir, Arc::new(repo))
}

pub async fn seed_user(repo: &SqliteRepository, username: &str) -> User {
    let hash = hash_password(TEST_PASSWORD).unwrap();
    repo.create_user(username, &hash).await.unwrap()
}

/// Valid configuration pointing at an in-memory database.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.database_url = "sqlite::memory:".to_string();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.encryption_key = Some("integration-test-encryption-key".to_string());
    config.auth.max_api_keys_per_user = 3;
    config.auth.secure_cookies = false;
    config
}
