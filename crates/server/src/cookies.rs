//! `Set-Cookie` values for the access and refresh token cookies.
//!
//! The refresh cookie is scoped to `/auth` so it is only sent to the refresh and logout
//! endpoints. Both are `HttpOnly` and `SameSite=Strict`.

use axum::http::HeaderMap;
use cookie::{time::Duration, Cookie, SameSite};
use tollgate_core::config::AuthConfig;

pub const REFRESH_COOKIE_PATH: &str = "/auth";
const ACCESS_COOKIE_PATH: &str = "/";

fn build(name: &str, value: &str, path: &'static str, max_age: Duration, secure: bool) -> String {
    Cookie::build((name.to_string(), value.to_string()))
        .path(path)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
        .to_string()
}

#[must_use]
pub fn access_cookie(config: &AuthConfig, token: &str) -> String {
    build(
        &config.access_cookie_name,
        token,
        ACCESS_COOKIE_PATH,
        Duration::minutes(config.access_token_ttl_minutes),
        config.secure_cookies,
    )
}

#[must_use]
pub fn refresh_cookie(config: &AuthConfig, token: &str) -> String {
    build(
        &config.refresh_cookie_name,
        token,
        REFRESH_COOKIE_PATH,
        Duration::days(config.refresh_token_max_age_days),
        config.secure_cookies,
    )
}

/// Expired, empty versions of both cookies.
#[must_use]
pub fn clear_cookies(config: &AuthConfig) -> Vec<String> {
    vec![
        build(&config.access_cookie_name, "", ACCESS_COOKIE_PATH, Duration::ZERO, config.secure_cookies),
        build(&config.refresh_cookie_name, "", REFRESH_COOKIE_PATH, Duration::ZERO, config.secure_cookies),
    ]
}

/// Joins every `Cookie` header of a request. HTTP/2 clients may split cookies across headers.
#[must_use]
pub fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let joined = headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}

/// Value of cookie `name`, if present and non-empty.
#[must_use]
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = cookie_header(headers)?;
    Cookie::split_parse(header.as_str())
        .filter_map(Result::ok)
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}
