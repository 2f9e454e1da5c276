use crate::{cookies::cookie_header, error::ApiError};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tollgate_core::{auth::resolver::RequestCredentials, services::CredentialServices};

/// Axum middleware that resolves the request's credential into an `AuthContext`.
///
/// Reads the bearer `Authorization` header, the access-token cookie and the `access_token`
/// query parameter, and hands them to the core resolver. On success the `AuthContext` is
/// inserted into request extensions for downstream handlers.
///
/// # Errors
///
/// Returns `401 {"error":"unauthenticated"}` for any authentication failure, or `500` if the
/// credential store is unavailable.
pub async fn auth_middleware(
    State(services): State<CredentialServices>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = RequestCredentials {
        authorization: request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        cookie: cookie_header(request.headers()),
        query: request.uri().query().map(str::to_string),
    };

    let context = services.resolver.resolve(&credentials).await.map_err(|e| {
        if e.is_authentication_failure() {
            tracing::warn!(path = %request.uri().path(), "authentication failed");
        }
        ApiError::from(e)
    })?;

    tracing::debug!(user_id = context.principal.user_id, method = %context.method, "request authenticated");
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}
