//! Shared application state.

use crate::auth::AuthLayer;
use crate::config::ServerConfig;
use crate::ratelimit::RateLimiter;
use crate::service::LicenseService;
use std::sync::Arc;

/// Everything handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LicenseService>,
    pub auth: Arc<AuthLayer>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<ServerConfig>,
}
