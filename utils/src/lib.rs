//! Shared infrastructure utilities for Tether.
//!
//! Cross-cutting helpers that multiple Tether crates need but that don't
//! belong in the domain-pure `tether-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)

pub mod atomic_write;

pub use atomic_write::{PersistMode, atomic_write, recover_bak_file};
