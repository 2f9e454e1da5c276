//! HTTP middleware components for the credential server.
//!
//! Axum adapters around `tollgate_core`: they deal with headers, cookies and status codes and
//! delegate every credential decision to the core library.

pub mod auth;
pub mod correlation_id;

pub use auth::auth_middleware;
pub use correlation_id::{create_request_id_layers, RequestIdSpan, UuidRequestIdGenerator, X_REQUEST_ID};
