//! Cross-crate integration tests.
//!
//! Per-component behavior is tested inside each crate; these suites cover
//! the flows that only exist once the crates are wired together.

mod auth_flow;
mod channel_flow;
mod notifications;
