//! Credential source precedence through fully wired services.

use crate::test_helpers::{seed_user, test_config};
use tollgate_core::{
    auth::{resolver::RequestCredentials, AuthError, AuthMethod},
    services::CredentialServices,
};

struct Fixture {
    services: CredentialServices,
    user_id: i64,
    jwt: String,
    api_key: String,
}

async fn fixture() -> Fixture {
    let services = CredentialServices::builder().with_config(test_config()).build().await.unwrap();
    let user = seed_user(&services.repository, "carol").await;
    let jwt = services.access_tokens.sign(user.id, &user.username).unwrap();
    let api_key = services.api_keys.create(user.id, "precedence").await.unwrap().raw_key;
    Fixture { services, user_id: user.id, jwt, api_key }
}

fn cookie(value: &str) -> Option<String> {
    Some(format!("theme=dark; access_token={value}"))
}

#[tokio::test]
async fn test_header_api_key_beats_cookie_jwt() {
    let f = fixture().await;
    let credentials = RequestCredentials {
        authorization: Some(format!("Bearer {}", f.api_key)),
        cookie: cookie(&f.jwt),
        query: None,
    };

    let context = f.services.resolver.resolve(&credentials).await.unwrap();
    assert_eq!(context.method, AuthMethod::ApiKey);
    assert_eq!(context.principal.user_id, f.user_id);
    assert!(context.api_key_id.is_some());
}

#[tokio::test]
async fn test_cookie_beats_query() {
    let f = fixture().await;
    let credentials = RequestCredentials {
        authorization: None,
        cookie: cookie(&f.jwt),
        query: Some(format!("access_token={}", f.api_key)),
    };

    let context = f.services.resolver.resolve(&credentials).await.unwrap();
    assert_eq!(context.method, AuthMethod::Jwt);
    assert_eq!(context.principal.username.as_deref(), Some("carol"));
}

#[tokio::test]
async fn test_query_used_when_alone() {
    let f = fixture().await;
    let credentials =
        RequestCredentials { query: Some(format!("page=2&access_token={}", f.api_key)), ..Default::default() };

    let context = f.services.resolver.resolve(&credentials).await.unwrap();
    assert_eq!(context.method, AuthMethod::ApiKey);
}

#[tokio::test]
async fn test_rejected_header_does_not_fall_back_to_cookie() {
    let f = fixture().await;

    for bad in ["ob_not-a-real-key", "not.a.jwt"] {
        let credentials = RequestCredentials {
            authorization: Some(format!("Bearer {bad}")),
            cookie: cookie(&f.jwt),
            query: None,
        };
        assert!(matches!(
            f.services.resolver.resolve(&credentials).await,
            Err(AuthError::Unauthenticated)
        ));
    }
}

#[tokio::test]
async fn test_revoked_key_rejected_immediately() {
    let f = fixture().await;
    let credentials =
        RequestCredentials { authorization: Some(format!("Bearer {}", f.api_key)), ..Default::default() };
    let context = f.services.resolver.resolve(&credentials).await.unwrap();

    f.services.api_keys.revoke(f.user_id, context.api_key_id.unwrap()).await.unwrap();

    assert!(matches!(
        f.services.resolver.resolve(&credentials).await,
        Err(AuthError::Unauthenticated)
    ));
}
