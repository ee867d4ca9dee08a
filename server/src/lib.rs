//! GIRO license server.
//!
//! Issues licenses, binds them to hardware fingerprints, validates them
//! against the record store, and signs every decision so clients can
//! cache it offline. The store serializes lifecycle mutations per
//! license key; this crate layers auth, rate limiting, and fraud
//! detection on top and exposes the HTTP API.

pub mod auth;
pub mod config;
pub mod error;
pub mod fraud;
pub mod ratelimit;
pub mod routes;
pub mod service;
pub mod signer;
pub mod state;

pub use config::{FraudPolicy, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
