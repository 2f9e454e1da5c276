//! Wiring of the credential components.
//!
//! [`CredentialServicesBuilder`] turns an [`AppConfig`] into a [`CredentialServices`] bundle,
//! constructing each component explicitly and in dependency order:
//!
//! ```text
//!   SqliteRepository ──┬──> RefreshTokenStore ──> RefreshTokenPurger
//!                      ├──> ApiKeyAuthenticator ──┐
//!   AccessTokenIssuer ─┼──────────────────────────┴──> AuthResolver
//!   CredentialCipher ──┴──> ProviderSecrets
//! ```
//!
//! Nothing is global: binaries and tests each build their own bundle.

mod builder;

pub use builder::{CredentialServicesBuilder, ServicesError};

use crate::{
    auth::{
        access_token::AccessTokenIssuer, purge::RefreshTokenPurger, refresh_token::RefreshTokenStore,
        repository::SqliteRepository, resolver::AuthResolver,
    },
    config::AppConfig,
    crypto::secrets::ProviderSecrets,
    middleware::ApiKeyAuthenticator,
};
use std::sync::Arc;

/// Every credential component, ready to share across request handlers.
#[derive(Clone)]
pub struct CredentialServices {
    pub config: Arc<AppConfig>,
    pub repository: Arc<SqliteRepository>,
    pub access_tokens: Arc<AccessTokenIssuer>,
    pub refresh_tokens: Arc<RefreshTokenStore>,
    pub api_keys: Arc<ApiKeyAuthenticator>,
    pub secrets: Arc<ProviderSecrets>,
    pub resolver: Arc<AuthResolver>,
    pub purger: Arc<RefreshTokenPurger>,
}

impl CredentialServices {
    #[must_use]
    pub fn builder() -> CredentialServicesBuilder {
        CredentialServicesBuilder::new()
    }
}
