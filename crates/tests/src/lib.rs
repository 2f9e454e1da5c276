//! Integration and End-to-End Tests for Tollgate
//!
//! This crate contains various test modules:
//!
//! - `refresh_rotation_tests`: rotation chains, replay handling and expiry boundaries against a
//!   real `SQLite` database, including concurrent rotation of one token
//! - `api_key_quota_tests`: per-user key quota under sequential and concurrent creation
//! - `secret_migration_tests`: legacy envelope upgrade, on read and in bulk
//! - `resolver_precedence_tests`: which credential wins when a request carries several
//! - `http_flow_tests`: full login → refresh → logout flows through the HTTP router
//! - `test_helpers`: shared fixtures (databases, users, configuration)
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
mod refresh_rotation_tests;

#[cfg(test)]
mod api_key_quota_tests;

#[cfg(test)]
mod secret_migration_tests;

#[cfg(test)]
mod resolver_precedence_tests;

#[cfg(test)]
mod http_flow_tests;
