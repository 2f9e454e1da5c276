//! End-to-end flows through the HTTP router, carrying cookies between requests the way a
//! browser would.

use crate::test_helpers::{seed_user, test_config, TEST_PASSWORD};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tollgate_core::services::CredentialServices;
use tower::ServiceExt;

async fn app() -> Router {
    let services = CredentialServices::builder().with_config(test_config()).build().await.unwrap();
    seed_user(&services.repository, "dave").await;
    server::create_app(services)
}

/// `name=value` pairs from every `Set-Cookie` header, ready for a `Cookie` header.
fn cookie_jar(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

async fn login(app: &Router) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"username": "dave", "password": TEST_PASSWORD}).to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

fn with_cookies(method: &str, uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_cookie_session_lifecycle() {
    let app = app().await;

    let response = login(&app).await;
    assert_eq!(response.status(), StatusCode::OK);
    let jar = cookie_jar(&response);

    let me = app.clone().oneshot(with_cookies("GET", "/me", &jar)).await.unwrap();
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(body_json(me).await["username"], "dave");

    let refreshed = app.clone().oneshot(with_cookies("POST", "/auth/refresh", &jar)).await.unwrap();
    assert_eq!(refreshed.status(), StatusCode::OK);
    let rotated_jar = cookie_jar(&refreshed);
    assert_ne!(rotated_jar, jar);

    // The browser that kept the old cookie now trips replay detection
    let replay = app.clone().oneshot(with_cookies("POST", "/auth/refresh", &jar)).await.unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let after_replay =
        app.clone().oneshot(with_cookies("POST", "/auth/refresh", &rotated_jar)).await.unwrap();
    assert_eq!(after_replay.status(), StatusCode::UNAUTHORIZED);

    // The short-lived access token is still valid until it expires
    let me = app.oneshot(with_cookies("GET", "/me", &rotated_jar)).await.unwrap();
    assert_eq!(me.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = app().await;
    let jar = cookie_jar(&login(&app).await);

    let logout = app.clone().oneshot(with_cookies("POST", "/auth/logout", &jar)).await.unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let refresh = app.oneshot(with_cookies("POST", "/auth/refresh", &jar)).await.unwrap();
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthenticated_responses_are_identical() {
    let app = app().await;

    let requests = [
        Request::builder().uri("/me").body(Body::empty()).unwrap(),
        Request::builder().uri("/me").header(header::AUTHORIZATION, "Bearer ob_bogus").body(Body::empty()).unwrap(),
        Request::builder().uri("/me").header(header::AUTHORIZATION, "Bearer a.b.c").body(Body::empty()).unwrap(),
        Request::builder().uri("/me?access_token=expired").body(Body::empty()).unwrap(),
        with_cookies("GET", "/me", "access_token=garbage"),
    ];

    for request in requests {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "unauthenticated"}));
    }
}

#[tokio::test]
async fn test_request_id_propagated() {
    let app = app().await;

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-me-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me-123");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, 128 * 1024)
        .body(Body::from(vec![b' '; 128 * 1024]))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
