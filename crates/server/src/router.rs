//! Route table.
//!
//! ```text
//!   public     GET  /health
//!              POST /auth/login | /auth/refresh | /auth/logout
//!   protected  POST /auth/logout-all
//!              GET  /me
//!              GET|POST /api-keys, DELETE /api-keys/{id}
//!              PUT|GET|DELETE /secrets/{provider}
//! ```
//!
//! Protected routes sit behind [`auth_middleware`], which puts the caller's `AuthContext`
//! into request extensions.

use crate::{
    handlers::{keys, secrets, session},
    middleware::{auth_middleware, create_request_id_layers, RequestIdSpan},
};
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tollgate_core::services::CredentialServices;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Request bodies are small JSON documents; anything larger is rejected.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub async fn handle_health() -> &'static str {
    "OK"
}

/// Builds the full application router.
pub fn create_app(services: CredentialServices) -> Router {
    let request_timeout = services.config.request_timeout();
    let (set_request_id, propagate_request_id) = create_request_id_layers();

    let public = Router::new()
        .route("/health", get(handle_health))
        .route("/auth/login", post(session::login))
        .route("/auth/refresh", post(session::refresh))
        .route("/auth/logout", post(session::logout));

    let protected = Router::new()
        .route("/auth/logout-all", post(session::logout_all))
        .route("/me", get(session::me))
        .route("/api-keys", get(keys::list_api_keys).post(keys::create_api_key))
        .route("/api-keys/{id}", delete(keys::revoke_api_key))
        .route(
            "/secrets/{provider}",
            get(secrets::get_secret).put(secrets::put_secret).delete(secrets::delete_secret),
        )
        .layer(axum_middleware::from_fn_with_state(services.clone(), auth_middleware));

    // Layers are applied in reverse order, so propagate runs after set
    public
        .merge(protected)
        .with_state(services)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdSpan))
        .layer(propagate_request_id)
        .layer(set_request_id)
}
