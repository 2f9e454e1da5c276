use super::{
    access_token::AccessTokenIssuer, api_key::API_KEY_PREFIX, AuthContext, AuthError, AuthMethod,
    Principal,
};
use crate::middleware::auth::ApiKeyAuthenticator;
use cookie::Cookie;
use std::sync::Arc;

/// Query parameter carrying an access token, for clients that can't set headers (`EventSource`).
pub const ACCESS_TOKEN_QUERY_PARAM: &str = "access_token";

/// Raw credential-bearing parts of a request, independent of the HTTP framework.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    /// `Authorization` header value
    pub authorization: Option<String>,
    /// `Cookie` header value
    pub cookie: Option<String>,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
}

/// Where a credential candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Bearer,
    Cookie,
    Query,
}

impl CredentialSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::Cookie => "cookie",
            Self::Query => "query",
        }
    }
}

/// A credential candidate, classified once by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    AccessToken(String),
}

impl Credential {
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with(API_KEY_PREFIX) {
            Self::ApiKey(raw.to_string())
        } else {
            Self::AccessToken(raw.to_string())
        }
    }
}

/// Resolves a request's credentials into an [`AuthContext`].
///
/// Exactly one candidate is considered: the first source present in the order bearer header,
/// access cookie, query parameter. A failing candidate never falls through to the next source.
pub struct AuthResolver {
    api_keys: Arc<ApiKeyAuthenticator>,
    access_tokens: Arc<AccessTokenIssuer>,
    access_cookie_name: String,
}

impl AuthResolver {
    pub fn new(
        api_keys: Arc<ApiKeyAuthenticator>,
        access_tokens: Arc<AccessTokenIssuer>,
        access_cookie_name: impl Into<String>,
    ) -> Self {
        Self { api_keys, access_tokens, access_cookie_name: access_cookie_name.into() }
    }

    /// Picks the credential candidate and the source it came from.
    #[must_use]
    pub fn extract(&self, credentials: &RequestCredentials) -> Option<(CredentialSource, String)> {
        if let Some(token) = credentials.authorization.as_deref().and_then(parse_bearer) {
            return Some((CredentialSource::Bearer, token.to_string()));
        }

        if let Some(token) = credentials
            .cookie
            .as_deref()
            .and_then(|header| find_cookie(header, &self.access_cookie_name))
        {
            return Some((CredentialSource::Cookie, token));
        }

        credentials
            .query
            .as_deref()
            .and_then(find_query_token)
            .map(|token| (CredentialSource::Query, token))
    }

    /// # Errors
    ///
    /// Every authentication failure becomes [`AuthError::Unauthenticated`]. Storage failures
    /// are returned as-is.
    pub async fn resolve(&self, credentials: &RequestCredentials) -> Result<AuthContext, AuthError> {
        let Some((source, raw)) = self.extract(credentials) else {
            return Err(AuthError::Unauthenticated);
        };

        let result = match Credential::classify(&raw) {
            Credential::ApiKey(key) => self.api_keys.authenticate(&key).await.map(|key| AuthContext {
                principal: Principal { user_id: key.user_id, username: None },
                method: AuthMethod::ApiKey,
                api_key_id: Some(key.key_id),
            }),
            Credential::AccessToken(token) => {
                self.access_tokens.verify(&token).map(|claims| AuthContext {
                    principal: Principal { user_id: claims.id, username: Some(claims.username) },
                    method: AuthMethod::Jwt,
                    api_key_id: None,
                })
            }
        };

        match result {
            Ok(context) => Ok(context),
            Err(e) if e.is_authentication_failure() => {
                tracing::debug!(source = source.as_str(), error = %e, "credential rejected");
                Err(AuthError::Unauthenticated)
            }
            Err(e) => {
                tracing::error!(source = source.as_str(), error = %e, "credential resolution failed");
                Err(e)
            }
        }
    }
}

fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn find_cookie(header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

fn find_query_token(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == ACCESS_TOKEN_QUERY_PARAM && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
