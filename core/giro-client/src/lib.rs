//! Client-side license validation for GIRO desktop deployments.
//!
//! This crate decides, locally, whether the application may run:
//! - At startup the UI renders immediately from the encrypted cache
//!   while a fresh validation runs in the background.
//! - Successful validations refresh the 72-hour grace window; network
//!   failures inside the window are invisible to the user.
//! - An explicit server decision (revoked, expired, hardware mismatch)
//!   forces `Invalid` immediately, overriding any cached allowance.
//!
//! The state machine itself is pure ([`state`] functions); the
//! [`ValidationController`] wires it to a [`ValidationApi`], a
//! [`Clock`], and the encrypted [`StateCache`], all injectable for
//! tests.

mod api;
mod cache;
mod controller;
mod error;
mod state;

pub use api::{ApiFailure, HttpValidationApi, ValidationApi};
pub use cache::StateCache;
pub use controller::{
    ClientConfig, Clock, RevalidationHandle, SystemClock, ValidationController,
};
pub use error::{ClientError, ClientResult};
pub use state::{
    cache_after_denial, cache_after_success, reconcile, state_from_cache, AttemptOutcome,
    CachedState, ClientState, InvalidReason, CACHE_VERSION,
};
