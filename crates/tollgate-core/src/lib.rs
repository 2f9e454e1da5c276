//! # Tollgate Core
//!
//! Credential lifecycle engine: issues and verifies the credentials a web service accepts,
//! and keeps third-party secrets encrypted at rest.
//!
//! - **[`auth`]**: short-lived access tokens, rotating refresh tokens with replay detection,
//!   request credential resolution, and the `SQLite` repositories behind them.
//!
//! - **[`middleware`]**: API key issuance, verification, per-user quota and revocation.
//!
//! - **[`crypto`]**: versioned AES-256-GCM envelopes for provider secrets, with transparent
//!   migration from the legacy key derivation.
//!
//! - **[`config`]**: layered configuration (defaults, TOML file, `TOLLGATE__*` env vars).
//!
//! - **[`services`]**: explicit construction of every component from an [`config::AppConfig`].
//!
//! ## Credential Flow
//!
//! ```text
//!   login ──> AccessTokenIssuer::sign ───────────> access token (15 min)
//!         └─> RefreshTokenStore::create ─────────> refresh token (family F)
//!
//!   refresh(token) ──> RefreshTokenStore::rotate ──┬─> Rotated: new token in F
//!                                                  ├─> Expired / NotFound
//!                                                  └─> Replayed: revoke all of F
//!
//!   request ──> AuthResolver::resolve ──> AuthContext { principal, method }
//! ```
//!
//! HTTP and CLI adapters live in the `server` and `cli` crates.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod middleware;
pub mod services;
