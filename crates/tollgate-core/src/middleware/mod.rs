//! Framework-independent request authentication.
//!
//! This module holds the business logic; HTTP adapters (axum extractors, cookies, responses)
//! live in the `server` crate's `middleware` module.
//!
//! - [`auth::ApiKeyAuthenticator`]: API key issuance, verification, quota and revocation
//! - [`AuthResolver`](crate::auth::resolver::AuthResolver) builds on it to resolve any
//!   request credential into an [`AuthContext`](crate::auth::AuthContext)

pub mod auth;

pub use auth::{ApiKeyAuthenticator, CreatedApiKey};
