//! HTTP error mapping.
//!
//! Every authentication failure renders the same `401 {"error":"unauthenticated"}` body, no
//! matter which check failed.

use axum::{
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use serde_json::json;
use tollgate_core::auth::AuthError;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    /// Authentication failed and the auth cookies should be cleared on the way out.
    UnauthenticatedClearCookies(Vec<String>),
    NotFound(&'static str),
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

fn unauthenticated() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthenticated" })))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) if err.is_authentication_failure() => unauthenticated().into_response(),
            ApiError::Auth(err) => {
                let status =
                    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (status, Json(json!({ "error": err.code(), "message": err.public_message() })))
                    .into_response()
            }
            ApiError::UnauthenticatedClearCookies(cookies) => {
                let headers: Vec<_> = cookies.into_iter().map(|c| (SET_COOKIE, c)).collect();
                (AppendHeaders(headers), unauthenticated()).into_response()
            }
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found", "message": what })))
                    .into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_request", "message": msg })))
                    .into_response()
            }
        }
    }
}
