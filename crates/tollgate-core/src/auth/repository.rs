use super::{
    api_key::{ApiKey, NewApiKey},
    refresh_token::{NewRefreshToken, RefreshToken},
    user::User,
    AuthError,
};
use crate::crypto::secrets::StoredSecret;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{str::FromStr, time::Duration};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 8;

/// Repository for API key rows.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Finds a non-revoked key by blind index. Caller must still verify with Argon2id.
    async fn find_by_blind_index(&self, blind_index: &str) -> Result<Option<ApiKey>, AuthError>;

    /// Looks up a plaintext key by blind index and verifies it against the stored hash.
    ///
    /// Returns `Ok(None)` for malformed, unknown, revoked or mismatching keys.
    async fn find_and_verify_key(&self, plaintext_key: &str) -> Result<Option<ApiKey>, AuthError> {
        if !ApiKey::is_valid_format(plaintext_key) {
            return Ok(None);
        }

        let blind_index = ApiKey::compute_blind_index(plaintext_key);
        let Some(key) = self.find_by_blind_index(&blind_index).await? else {
            return Ok(None);
        };

        if ApiKey::verify_key_blocking(plaintext_key.to_string(), key.key_hash.clone()).await {
            Ok(Some(key))
        } else {
            tracing::warn!(key_id = key.id, "blind index matched but Argon2 verification failed");
            Ok(None)
        }
    }

    async fn count_active(&self, user_id: i64) -> Result<i64, AuthError>;

    /// Inserts `key` only if the user holds fewer than `limit` active keys.
    ///
    /// The count and the insert are a single statement, so concurrent creations can't
    /// overshoot. Returns `Ok(None)` when the limit was reached.
    async fn create_within_limit(
        &self,
        key: NewApiKey,
        limit: u32,
    ) -> Result<Option<ApiKey>, AuthError>;

    /// All keys of a user, revoked ones included, newest first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ApiKey>, AuthError>;

    /// Soft-revokes a key owned by `user_id`. Returns `false` if no active key matched.
    async fn revoke_key(&self, user_id: i64, key_id: i64) -> Result<bool, AuthError>;

    async fn update_last_used(&self, key_id: i64) -> Result<(), AuthError>;
}

/// Repository for refresh token rows.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, AuthError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError>;

    /// Revokes `current_id` and inserts `replacement` in one transaction.
    ///
    /// The revoke is conditional on the token still being live. Returns `false` (and writes
    /// nothing) when another rotation got there first.
    async fn rotate(
        &self,
        current_id: i64,
        replacement: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Returns `false` if the token was already revoked.
    async fn revoke_token(&self, id: i64, now: DateTime<Utc>) -> Result<bool, AuthError>;

    /// Revokes every live token in a family. Returns the number of rows revoked.
    async fn revoke_family(&self, family_id: &str, now: DateTime<Utc>) -> Result<u64, AuthError>;

    async fn revoke_all_for_user(&self, user_id: i64, now: DateTime<Utc>)
        -> Result<u64, AuthError>;

    /// Hard-deletes rows whose expiry is before `cutoff`.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError>;
}

/// Repository for encrypted provider secrets, keyed by (owner, provider).
#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn get(&self, owner_id: i64, provider: &str) -> Result<Option<String>, AuthError>;

    /// Inserts or overwrites.
    async fn put(&self, owner_id: i64, provider: &str, value: &str) -> Result<(), AuthError>;

    /// Overwrites only if the stored value is still `expected`. Returns whether it did.
    async fn replace_if_unchanged(
        &self,
        owner_id: i64,
        provider: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, AuthError>;

    async fn delete(&self, owner_id: i64, provider: &str) -> Result<bool, AuthError>;

    async fn list_all(&self) -> Result<Vec<StoredSecret>, AuthError>;
}

/// Read access to the user table owned by the account service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, AuthError>;

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AuthError>;
}

pub struct SqliteRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRepository {
    /// Schema for every table the credential engine touches. Idempotent.
    pub const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            family_id TEXT NOT NULL,
            expires_at TIMESTAMP NOT NULL,
            revoked_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_refresh_tokens_family ON refresh_tokens(family_id);
        CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);
        CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires ON refresh_tokens(expires_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_refresh_tokens_live_family
            ON refresh_tokens(family_id) WHERE revoked_at IS NULL;

        CREATE TABLE IF NOT EXISTS api_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            key_hash TEXT NOT NULL,
            blind_index TEXT NOT NULL UNIQUE,
            key_prefix TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            last_used_at TIMESTAMP,
            revoked_at TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);

        CREATE TABLE IF NOT EXISTS provider_secrets (
            owner_id INTEGER NOT NULL,
            provider TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            PRIMARY KEY (owner_id, provider)
        );
    ";

    /// Connects to `database_url`, creating the file if needed.
    ///
    /// In-memory databases get a single long-lived connection so every caller sees the
    /// same data.
    ///
    /// # Errors
    /// Returns `AuthError::StorageError` if the URL is invalid or the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, AuthError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = if Self::is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(BUSY_TIMEOUT)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    /// Connects and applies [`Self::SCHEMA`].
    ///
    /// # Errors
    /// Returns `AuthError::StorageError` on connection or DDL failure.
    pub async fn connect_and_migrate(database_url: &str) -> Result<Self, AuthError> {
        let repo = Self::new(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// # Errors
    /// Returns `AuthError::StorageError` if the DDL fails.
    pub async fn migrate(&self) -> Result<(), AuthError> {
        sqlx::raw_sql(Self::SCHEMA).execute(&self.pool).await?;
        tracing::debug!("credential schema applied");
        Ok(())
    }

    fn is_in_memory(database_url: &str) -> bool {
        database_url.contains(":memory:") || database_url.contains("mode=memory")
    }

    /// Extracts a non-nullable field from a database row.
    fn get_required<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, AuthError>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get::<T, _>(column)
            .map_err(|e| AuthError::StorageError(format!("column '{column}': {e}")))
    }

    fn get_timestamp(
        row: &sqlx::sqlite::SqliteRow,
        column: &str,
    ) -> Result<DateTime<Utc>, AuthError> {
        let naive: NaiveDateTime = Self::get_required(row, column)?;
        Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
    }

    fn get_optional_timestamp(
        row: &sqlx::sqlite::SqliteRow,
        column: &str,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        let naive: Option<NaiveDateTime> = Self::get_required(row, column)?;
        Ok(naive.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)))
    }

    fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey, AuthError> {
        Ok(ApiKey {
            id: Self::get_required(row, "id")?,
            user_id: Self::get_required(row, "user_id")?,
            key_hash: Self::get_required(row, "key_hash")?,
            blind_index: Self::get_required(row, "blind_index")?,
            key_prefix: Self::get_required(row, "key_prefix")?,
            name: Self::get_required(row, "name")?,
            created_at: Self::get_timestamp(row, "created_at")?,
            last_used_at: Self::get_optional_timestamp(row, "last_used_at")?,
            revoked_at: Self::get_optional_timestamp(row, "revoked_at")?,
        })
    }

    fn row_to_refresh_token(row: &sqlx::sqlite::SqliteRow) -> Result<RefreshToken, AuthError> {
        Ok(RefreshToken {
            id: Self::get_required(row, "id")?,
            user_id: Self::get_required(row, "user_id")?,
            token_hash: Self::get_required(row, "token_hash")?,
            family_id: Self::get_required(row, "family_id")?,
            expires_at: Self::get_timestamp(row, "expires_at")?,
            revoked_at: Self::get_optional_timestamp(row, "revoked_at")?,
            created_at: Self::get_timestamp(row, "created_at")?,
        })
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, AuthError> {
        Ok(User {
            id: Self::get_required(row, "id")?,
            username: Self::get_required(row, "username")?,
            password_hash: Self::get_required(row, "password_hash")?,
            created_at: Self::get_timestamp(row, "created_at")?,
        })
    }
}

#[async_trait]
impl ApiKeyRepository for SqliteRepository {
    async fn find_by_blind_index(&self, blind_index: &str) -> Result<Option<ApiKey>, AuthError> {
        let result = sqlx::query(
            r"
            SELECT id, user_id, key_hash, blind_index, key_prefix, name,
                   created_at, last_used_at, revoked_at
            FROM api_keys
            WHERE blind_index = ? AND revoked_at IS NULL
            ",
        )
        .bind(blind_index)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| Self::row_to_api_key(&row)).transpose()
    }

    async fn count_active(&self, user_id: i64) -> Result<i64, AuthError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS active
            FROM api_keys
            WHERE user_id = ? AND revoked_at IS NULL
            ",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Self::get_required(&row, "active")
    }

    async fn create_within_limit(
        &self,
        key: NewApiKey,
        limit: u32,
    ) -> Result<Option<ApiKey>, AuthError> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r"
            INSERT INTO api_keys (user_id, key_hash, blind_index, key_prefix, name, created_at)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE (SELECT COUNT(*) FROM api_keys WHERE user_id = ? AND revoked_at IS NULL) < ?
            ",
        )
        .bind(key.user_id)
        .bind(&key.key_hash)
        .bind(&key.blind_index)
        .bind(&key.key_prefix)
        .bind(&key.name)
        .bind(created_at.naive_utc())
        .bind(key.user_id)
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(ApiKey {
            id: result.last_insert_rowid(),
            user_id: key.user_id,
            key_hash: key.key_hash,
            blind_index: key.blind_index,
            key_prefix: key.key_prefix,
            name: key.name,
            created_at,
            last_used_at: None,
            revoked_at: None,
        }))
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ApiKey>, AuthError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, key_hash, blind_index, key_prefix, name,
                   created_at, last_used_at, revoked_at
            FROM api_keys
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| Self::row_to_api_key(&row)).collect()
    }

    async fn revoke_key(&self, user_id: i64, key_id: i64) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r"
            UPDATE api_keys
            SET revoked_at = ?
            WHERE id = ? AND user_id = ? AND revoked_at IS NULL
            ",
        )
        .bind(Utc::now().naive_utc())
        .bind(key_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_last_used(&self, key_id: i64) -> Result<(), AuthError> {
        sqlx::query(
            r"
            UPDATE api_keys
            SET last_used_at = ?
            WHERE id = ?
            ",
        )
        .bind(Utc::now().naive_utc())
        .bind(key_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for SqliteRepository {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, AuthError> {
        let id = sqlx::query(
            r"
            INSERT INTO refresh_tokens (user_id, token_hash, family_id, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.family_id)
        .bind(token.expires_at.naive_utc())
        .bind(token.created_at.naive_utc())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(RefreshToken {
            id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            family_id: token.family_id,
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: token.created_at,
        })
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        let result = sqlx::query(
            r"
            SELECT id, user_id, token_hash, family_id, expires_at, revoked_at, created_at
            FROM refresh_tokens
            WHERE token_hash = ?
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| Self::row_to_refresh_token(&row)).transpose()
    }

    async fn rotate(
        &self,
        current_id: i64,
        replacement: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut tx = self.pool.begin().await?;

        // The conditional revoke must be the first statement: it takes the write lock, so a
        // concurrent rotation of the same token waits here and then sees zero rows.
        let revoked = sqlx::query(
            r"
            UPDATE refresh_tokens
            SET revoked_at = ?
            WHERE id = ? AND revoked_at IS NULL
            ",
        )
        .bind(now.naive_utc())
        .bind(current_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if revoked == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r"
            INSERT INTO refresh_tokens (user_id, token_hash, family_id, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(&replacement.family_id)
        .bind(replacement.expires_at.naive_utc())
        .bind(replacement.created_at.naive_utc())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_token(&self, id: i64, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r"
            UPDATE refresh_tokens
            SET revoked_at = ?
            WHERE id = ? AND revoked_at IS NULL
            ",
        )
        .bind(now.naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_family(&self, family_id: &str, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r"
            UPDATE refresh_tokens
            SET revoked_at = ?
            WHERE family_id = ? AND revoked_at IS NULL
            ",
        )
        .bind(now.naive_utc())
        .bind(family_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r"
            UPDATE refresh_tokens
            SET revoked_at = ?
            WHERE user_id = ? AND revoked_at IS NULL
            ",
        )
        .bind(now.naive_utc())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r"
            DELETE FROM refresh_tokens
            WHERE expires_at < ?
            ",
        )
        .bind(cutoff.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SecretRepository for SqliteRepository {
    async fn get(&self, owner_id: i64, provider: &str) -> Result<Option<String>, AuthError> {
        let result = sqlx::query(
            r"
            SELECT value
            FROM provider_secrets
            WHERE owner_id = ? AND provider = ?
            ",
        )
        .bind(owner_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| Self::get_required(&row, "value")).transpose()
    }

    async fn put(&self, owner_id: i64, provider: &str, value: &str) -> Result<(), AuthError> {
        sqlx::query(
            r"
            INSERT INTO provider_secrets (owner_id, provider, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (owner_id, provider)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
        )
        .bind(owner_id)
        .bind(provider)
        .bind(value)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_if_unchanged(
        &self,
        owner_id: i64,
        provider: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r"
            UPDATE provider_secrets
            SET value = ?, updated_at = ?
            WHERE owner_id = ? AND provider = ? AND value = ?
            ",
        )
        .bind(value)
        .bind(Utc::now().naive_utc())
        .bind(owner_id)
        .bind(provider)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, owner_id: i64, provider: &str) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r"
            DELETE FROM provider_secrets
            WHERE owner_id = ? AND provider = ?
            ",
        )
        .bind(owner_id)
        .bind(provider)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<StoredSecret>, AuthError> {
        let rows = sqlx::query(
            r"
            SELECT owner_id, provider, value, updated_at
            FROM provider_secrets
            ORDER BY owner_id, provider
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredSecret {
                    owner_id: Self::get_required(&row, "owner_id")?,
                    provider: Self::get_required(&row, "provider")?,
                    value: Self::get_required(&row, "value")?,
                    updated_at: Self::get_timestamp(&row, "updated_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UserDirectory for SqliteRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let result = sqlx::query(
            r"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| Self::row_to_user(&row)).transpose()
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, AuthError> {
        let result = sqlx::query(
            r"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE id = ?
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| Self::row_to_user(&row)).transpose()
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AuthError> {
        let created_at = Utc::now();
        let id = sqlx::query(
            r"
            INSERT INTO users (username, password_hash, created_at)
            VALUES (?, ?, ?)
            ",
        )
        .bind(username)
        .bind(password_hash)
        .bind(created_at.naive_utc())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }
}
