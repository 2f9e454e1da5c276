use super::CredentialServices;
use crate::{
    auth::{
        access_token::AccessTokenIssuer, purge::RefreshTokenPurger, refresh_token::RefreshTokenStore,
        repository::SqliteRepository, resolver::AuthResolver, AuthError,
    },
    config::AppConfig,
    crypto::{cipher::CredentialCipher, secrets::ProviderSecrets},
    middleware::ApiKeyAuthenticator,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while assembling the credential services.
#[derive(Debug, Error)]
pub enum ServicesError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Database connection or migration failed
    #[error("Storage initialization failed: {0}")]
    Storage(String),

    /// A component rejected its configuration
    #[error("Initialization failed: {0}")]
    Initialization(#[from] AuthError),
}

/// Builder for [`CredentialServices`].
///
/// # Examples
///
/// ```no_run
/// # use tollgate_core::{config::AppConfig, services::CredentialServicesBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
/// let services = CredentialServicesBuilder::new().with_config(config).build().await?;
/// # Ok(())
/// # }
/// ```
pub struct CredentialServicesBuilder {
    config: Option<AppConfig>,
    repository: Option<Arc<SqliteRepository>>,
}

impl CredentialServicesBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, repository: None }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses an already connected repository instead of opening `auth.database_url`.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<SqliteRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// # Errors
    ///
    /// Returns `ServicesError` if configuration is missing or invalid, the database can't be
    /// opened or migrated, or a component rejects its settings.
    pub async fn build(self) -> Result<CredentialServices, ServicesError> {
        let config = self.config.ok_or_else(|| {
            ServicesError::ConfigValidation("No configuration provided".to_string())
        })?;
        config.validate().map_err(ServicesError::ConfigValidation)?;

        info!(
            database_url = %redact_database_url(&config.auth.database_url),
            encryption_enabled = config.auth.encryption_key.is_some(),
            max_api_keys_per_user = config.auth.max_api_keys_per_user,
            "Initializing credential services"
        );

        let repository = match self.repository {
            Some(repository) => repository,
            None => Arc::new(
                SqliteRepository::connect_and_migrate(&config.auth.database_url)
                    .await
                    .map_err(|e| ServicesError::Storage(e.to_string()))?,
            ),
        };
        debug!("Credential repository ready");

        let access_tokens =
            Arc::new(AccessTokenIssuer::new(&config.auth.jwt_secret, config.access_token_ttl())?);

        let refresh_tokens = Arc::new(RefreshTokenStore::new(
            repository.clone(),
            config.refresh_token_max_age(),
            config.refresh_token_retention(),
        ));

        let api_keys =
            Arc::new(ApiKeyAuthenticator::new(repository.clone(), config.auth.max_api_keys_per_user));

        let cipher = Arc::new(CredentialCipher::new(config.auth.encryption_key.as_deref())?);
        let secrets = Arc::new(ProviderSecrets::new(repository.clone(), cipher));

        let resolver = Arc::new(AuthResolver::new(
            api_keys.clone(),
            access_tokens.clone(),
            config.auth.access_cookie_name.clone(),
        ));

        let purger = Arc::new(RefreshTokenPurger::new(refresh_tokens.clone(), config.purge_interval()));
        debug!("Credential components initialized");

        info!("Credential services initialization complete");

        Ok(CredentialServices {
            config: Arc::new(config),
            repository,
            access_tokens,
            refresh_tokens,
            api_keys,
            secrets,
            resolver,
            purger,
        })
    }
}

impl Default for CredentialServicesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips anything that looks like credentials from a database URL before logging it.
fn redact_database_url(url: &str) -> String {
    match url.split_once('@') {
        Some((_, host)) => format!("***@{host}"),
        None => url.to_string(),
    }
}
