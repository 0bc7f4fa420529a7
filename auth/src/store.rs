//! Durable credential storage.
//!
//! One JSON file holds the whole session: access token, refresh token,
//! absolute expiry, and the current-user record. Every mutation rewrites the
//! file atomically with owner-only permissions, so a crash mid-write can
//! never leave a torn session behind.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use tether_types::{Credential, StoredSession, UserRecord};
use tether_utils::{PersistMode, atomic_write, recover_bak_file};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode session: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Owns the current credential and user record.
///
/// Interior mutability via `RwLock`; the lock is never held across an await
/// point. Readers always see the last fully written session.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: RwLock<Option<StoredSession>>,
}

impl CredentialStore {
    /// Open a store backed by `path`, loading any session persisted there.
    ///
    /// A missing file starts unauthenticated; an unreadable or corrupt file
    /// is treated the same way after a warning.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        recover_bak_file(&path);
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StoredSession>(&content) {
                Ok(session) => {
                    debug!(user = %session.user.email, "Loaded stored session");
                    Some(session)
                }
                Err(err) => {
                    warn!(path = %path.display(), "Ignoring corrupt session file: {err}");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), "Failed to read session file: {err}");
                None
            }
        };
        Self {
            path: Some(path),
            state: RwLock::new(state),
        }
    }

    /// A store with no backing file. State lives for the process only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.read_state().as_ref().map(|s| s.credential.clone())
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserRecord> {
        self.read_state().as_ref().map(|s| s.user.clone())
    }

    /// Whether there is no usable access token as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.read_state()
            .as_ref()
            .is_none_or(|s| s.credential.is_expired(now))
    }

    /// Replace the whole session (login path).
    pub fn set_session(&self, session: StoredSession) -> Result<(), StoreError> {
        let mut state = self.write_state();
        *state = Some(session);
        self.persist(state.as_ref())
    }

    /// Swap in a renewed access token, keeping the refresh token and user.
    ///
    /// Returns `Ok(None)` when there is no session to renew (logged out while
    /// the refresh was in flight); the renewal is discarded in that case.
    /// The in-memory credential is updated even if persisting it fails.
    pub fn renew(
        &self,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        let mut state = self.write_state();
        let Some(session) = state.as_mut() else {
            return Ok(None);
        };
        session.credential = session.credential.renewed(access_token, expires_at);
        let renewed = session.credential.clone();
        self.persist(state.as_ref())?;
        Ok(Some(renewed))
    }

    /// Drop the session and remove the session file.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.write_state();
        *state = None;
        if let Some(path) = &self.path
            && let Err(err) = std::fs::remove_file(path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            return Err(err.into());
        }
        Ok(())
    }

    fn persist(&self, state: Option<&StoredSession>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let Some(session) = state else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(session)?;
        atomic_write(path, &json, PersistMode::SensitiveOwnerOnly)?;
        Ok(())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Option<StoredSession>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, Option<StoredSession>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
