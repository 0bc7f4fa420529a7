//! Authentication layer for Tether.
//!
//! # Architecture
//!
//! Three pieces cooperate to keep API calls authenticated while credentials
//! rotate underneath them:
//!
//! - [`CredentialStore`] - owns the current credential and user record,
//!   durable across restarts via an atomically replaced session file
//! - [`RefreshCoordinator`] - single-flight token renewal; any number of
//!   concurrent expired calls produce exactly one refresh request
//! - [`ApiClient`] - attaches the bearer token to outgoing calls, detects
//!   authorization failures, and retries once after a successful refresh
//!
//! The store is the single piece of mutable state shared by all three (and by
//! the push channel); every write replaces the whole session, so readers see
//! either the old credential or the new one, never a mix.
//!
//! # Error Handling
//!
//! A 401 on a protected call is resolved transparently: the caller only ever
//! observes [`ApiError::AuthExpired`] when the retried call fails again.
//! [`RefreshError`] propagates to every queued caller, clears the store, and
//! emits [`AuthEvent::ForcedLogout`] - it is not locally recoverable.

mod http;
mod refresh;
mod store;

pub use http::{ApiClient, ApiError, build_http_client, expect_success};
pub use refresh::{AuthEvent, RefreshCoordinator, RefreshError};
pub use store::{CredentialStore, StoreError};
