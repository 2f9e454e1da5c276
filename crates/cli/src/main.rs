use clap::{Parser, Subcommand};
use std::sync::Arc;
use tollgate_core::{auth::repository::SqliteRepository, config::AppConfig};

mod commands;
use commands::{
    handle_keys_command, handle_secrets_command, handle_tokens_command, KeysCommands,
    SecretsCommands, TokensCommands,
};

#[derive(Parser)]
#[command(name = "tollgate-cli")]
#[command(about = "Tollgate CLI - operator tool for API keys, refresh tokens and stored secrets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `auth.database_url` from the configuration
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// API Key Management
    #[command(subcommand)]
    Keys(KeysCommands),

    /// Refresh Token Housekeeping
    #[command(subcommand)]
    Tokens(TokensCommands),

    /// Stored Secret Maintenance
    #[command(subcommand)]
    Secrets(SecretsCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let database_url = cli.database.unwrap_or_else(|| config.auth.database_url.clone());
    let repo = Arc::new(SqliteRepository::connect_and_migrate(&database_url).await?);

    match cli.command {
        Commands::Keys(keys_command) => {
            handle_keys_command(keys_command, repo, config.auth.max_api_keys_per_user).await?;
        }

        Commands::Tokens(tokens_command) => {
            handle_tokens_command(
                tokens_command,
                repo,
                config.refresh_token_max_age(),
                config.refresh_token_retention(),
            )
            .await?;
        }

        Commands::Secrets(secrets_command) => {
            handle_secrets_command(secrets_command, repo, config.auth.encryption_key.as_deref())
                .await?;
        }
    }

    Ok(())
}
