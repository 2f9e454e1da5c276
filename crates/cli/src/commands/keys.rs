use clap::Subcommand;
use prettytable::{row, Table};
use std::sync::Arc;
use tollgate_core::{auth::repository::SqliteRepository, middleware::ApiKeyAuthenticator};

#[derive(Debug, Subcommand)]
pub enum KeysCommands {
    /// Create a new API key for a user
    Create {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long)]
        name: String,
    },

    /// List a user's API keys, revoked ones included
    List {
        #[arg(short, long)]
        user: i64,
    },

    /// Revoke one of a user's API keys
    Revoke {
        #[arg(short, long)]
        user: i64,

        #[arg(long)]
        id: i64,
    },
}

pub async fn handle_keys_command(
    command: KeysCommands,
    repo: Arc<SqliteRepository>,
    max_keys_per_user: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let authenticator = ApiKeyAuthenticator::new(repo, max_keys_per_user);

    match command {
        KeysCommands::Create { user, name } => {
            let created = authenticator.create(user, &name).await?;

            println!("[SUCCESS] API Key created successfully!");
            println!("ID: {}", created.api_key.id);
            println!("Name: {}", created.api_key.name);
            println!("Key: {}", created.raw_key);
            println!("[WARNING] Save this key securely - it cannot be retrieved later!");
        }

        KeysCommands::List { user } => {
            handle_list_keys(&authenticator, user).await?;
        }

        KeysCommands::Revoke { user, id } => {
            authenticator.revoke(user, id).await?;
            println!("[SUCCESS] API Key {id} has been revoked");
        }
    }

    Ok(())
}

async fn handle_list_keys(
    authenticator: &ApiKeyAuthenticator,
    user_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = authenticator.list(user_id).await?;

    let mut table = Table::new();
    table.add_row(row!["ID", "Name", "Prefix", "Active", "Created", "Last Used"]);

    for key in keys {
        table.add_row(row![
            key.id,
            key.name,
            key.key_prefix,
            if key.is_revoked() { "[REVOKED]" } else { "[ACTIVE]" },
            key.created_at.format("%Y-%m-%d %H:%M"),
            key.last_used_at
                .map_or("Never".to_string(), |l| l.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    table.printstd();

    Ok(())
}
