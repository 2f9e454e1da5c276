use chrono::Duration;
use clap::Subcommand;
use std::sync::Arc;
use tollgate_core::auth::{refresh_token::RefreshTokenStore, repository::SqliteRepository};

#[derive(Debug, Subcommand)]
pub enum TokensCommands {
    /// Delete refresh tokens expired for longer than the retention window
    Purge,

    /// Revoke every refresh token family of a user
    RevokeAll {
        #[arg(short, long)]
        user: i64,
    },
}

pub async fn handle_tokens_command(
    command: TokensCommands,
    repo: Arc<SqliteRepository>,
    max_age: Duration,
    retention: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = RefreshTokenStore::new(repo, max_age, retention);

    match command {
        TokensCommands::Purge => {
            let deleted = store.purge_expired().await?;
            println!("[SUCCESS] Purged {deleted} expired refresh tokens");
        }

        TokensCommands::RevokeAll { user } => {
            let revoked = store.revoke_all(user).await?;
            println!("[SUCCESS] Revoked {revoked} refresh tokens for user {user}");
        }
    }

    Ok(())
}
