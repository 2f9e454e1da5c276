//! HTTP surface for the credential services: session endpoints, API key management and
//! provider secrets, all behind a shared authentication middleware.

pub mod cookies;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use router::create_app;
