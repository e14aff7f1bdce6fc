//! Featuregate — resource-scoped feature flag service with API-token auth.
//!
//! The binary in `main.rs` wires this crate to a CLI; integration tests in
//! `tests/` consume it directly.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod store;

use std::sync::Arc;

use auth::SessionVerifier;
use store::postgres::PgStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub db: PgStore,
    pub sessions: Arc<dyn SessionVerifier>,
}
