use clap::Subcommand;
use std::sync::Arc;
use tollgate_core::{
    auth::repository::SqliteRepository,
    crypto::{cipher::CredentialCipher, secrets::ProviderSecrets},
};

#[derive(Debug, Subcommand)]
pub enum SecretsCommands {
    /// Re-encrypt every stored secret still under the legacy key derivation
    Upgrade,
}

pub async fn handle_secrets_command(
    command: SecretsCommands,
    repo: Arc<SqliteRepository>,
    encryption_key: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cipher = CredentialCipher::new(encryption_key)?;
    if !cipher.is_enabled() {
        return Err("An encryption key is required to upgrade secrets (TOLLGATE__AUTH__ENCRYPTION_KEY)".into());
    }
    let secrets = ProviderSecrets::new(repo, Arc::new(cipher));

    match command {
        SecretsCommands::Upgrade => {
            let upgraded = secrets.upgrade_all().await?;
            println!("[SUCCESS] Upgraded {upgraded} stored secrets to the current envelope");
        }
    }

    Ok(())
}
