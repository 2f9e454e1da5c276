//! Login, refresh, logout and `/me`.

use crate::{
    cookies::{access_cookie, clear_cookies, find_cookie, refresh_cookie},
    error::ApiError,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tollgate_core::{
    auth::{
        repository::UserDirectory,
        user::authenticate_password,
        AuthContext, AuthError, AuthMethod,
    },
    services::CredentialServices,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Optional body of `/auth/refresh` and `/auth/logout` for clients that can't use cookies.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i64,
    pub username: Option<String>,
    pub auth_method: AuthMethod,
    pub api_key_id: Option<i64>,
}

/// Refresh token from the refresh cookie, falling back to the JSON body.
fn presented_refresh_token(services: &CredentialServices, headers: &HeaderMap, body: &Bytes) -> Option<String> {
    find_cookie(headers, &services.config.auth.refresh_cookie_name).or_else(|| {
        serde_json::from_slice::<RefreshRequest>(body)
            .ok()
            .and_then(|r| r.refresh_token)
            .filter(|t| !t.is_empty())
    })
}

fn token_response(
    services: &CredentialServices,
    user_id: i64,
    username: &str,
    refresh_token: String,
) -> Result<Response, ApiError> {
    let access_token = services.access_tokens.sign(user_id, username)?;
    let auth_config = &services.config.auth;

    let cookies = AppendHeaders([
        (SET_COOKIE, access_cookie(auth_config, &access_token)),
        (SET_COOKIE, refresh_cookie(auth_config, &refresh_token)),
    ]);
    let body = TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: services.access_tokens.ttl().num_seconds(),
    };

    Ok((cookies, Json(body)).into_response())
}

fn no_content_clearing_cookies(services: &CredentialServices) -> Response {
    let cookies: Vec<_> =
        clear_cookies(&services.config.auth).into_iter().map(|c| (SET_COOKIE, c)).collect();
    (StatusCode::NO_CONTENT, AppendHeaders(cookies)).into_response()
}

/// POST /auth/login
pub async fn login(
    State(services): State<CredentialServices>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let candidate = services.repository.find_by_username(&request.username).await?;
    let Some(user) = authenticate_password(candidate, request.password).await else {
        tracing::warn!("login rejected");
        return Err(AuthError::Unauthenticated.into());
    };

    let issued = services.refresh_tokens.create(user.id).await?;
    tracing::info!(user_id = user.id, family_id = %issued.family_id, "user logged in");

    token_response(&services, user.id, &user.username, issued.raw_token)
}

/// POST /auth/refresh
pub async fn refresh(
    State(services): State<CredentialServices>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let clear = || ApiError::UnauthenticatedClearCookies(clear_cookies(&services.config.auth));

    let Some(raw_token) = presented_refresh_token(&services, &headers, &body) else {
        return Err(clear());
    };

    let rotated = match services.refresh_tokens.rotate(&raw_token).await?.into_result() {
        Ok(rotated) => rotated,
        Err(e) => {
            tracing::debug!(error = %e, "refresh rejected");
            return Err(clear());
        }
    };

    let Some(user) = services.repository.find_by_id(rotated.user_id).await? else {
        tracing::warn!(user_id = rotated.user_id, "refresh token belongs to unknown user");
        return Err(clear());
    };

    token_response(&services, user.id, &user.username, rotated.raw_token)
}

/// POST /auth/logout
///
/// Always succeeds; a missing or unknown token just means there is nothing to revoke.
pub async fn logout(
    State(services): State<CredentialServices>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(raw_token) = presented_refresh_token(&services, &headers, &body) {
        if let Err(e) = services.refresh_tokens.revoke_one(&raw_token).await {
            tracing::warn!(error = %e, "failed to revoke refresh token on logout");
        }
    }

    no_content_clearing_cookies(&services)
}

/// POST /auth/logout-all
pub async fn logout_all(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let revoked = services.refresh_tokens.revoke_all(context.principal.user_id).await?;
    tracing::info!(user_id = context.principal.user_id, revoked, "all sessions revoked");

    Ok(no_content_clearing_cookies(&services))
}

/// GET /me
pub async fn me(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<MeResponse>, ApiError> {
    let username = match context.principal.username {
        Some(username) => Some(username),
        None => services.repository.find_by_id(context.principal.user_id).await?.map(|u| u.username),
    };

    Ok(Json(MeResponse {
        user_id: context.principal.user_id,
        username,
        auth_method: context.method,
        api_key_id: context.api_key_id,
    }))
}
