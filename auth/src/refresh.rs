//! Single-flight token renewal.
//!
//! Any number of calls can discover an expired credential at the same time;
//! only the first one issues a refresh request. Everyone else parks on a
//! queued oneshot and is replayed, FIFO, with whatever outcome that one
//! request produced. The refresh itself runs as a detached task, so it always
//! completes and its outcome is applied even if every waiting caller has
//! since been abandoned.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use tether_types::wire::{RefreshRequest, RefreshResponse};

use crate::store::CredentialStore;

/// Why a refresh cycle failed. Cloned into every queued waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no stored session to refresh")]
    NoSession,
    #[error("refresh rejected by the server (status {status})")]
    Rejected { status: u16 },
    #[error("refresh endpoint unreachable: {detail}")]
    Unreachable { detail: String },
    #[error("refresh interrupted before completing")]
    Interrupted,
}

/// Out-of-band signals produced by refresh cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A refresh replaced the stored credential. The push channel uses this
    /// to re-handshake with the new token.
    CredentialRotated,
    /// The session is gone and the user must sign in again.
    ForcedLogout { reason: RefreshError },
}

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<Waiter>,
}

struct Inner {
    client: reqwest::Client,
    refresh_url: String,
    store: Arc<CredentialStore>,
    state: Mutex<RefreshState>,
    events: mpsc::UnboundedSender<AuthEvent>,
}

/// Serializes credential renewal across concurrent callers.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Returns the coordinator plus the receiver for its [`AuthEvent`]s.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        store: Arc<CredentialStore>,
    ) -> (Self, mpsc::UnboundedReceiver<AuthEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            client,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            store,
            state: Mutex::new(RefreshState::default()),
            events,
        });
        (Self { inner }, events_rx)
    }

    /// Obtain a fresh access token, joining the in-flight refresh if one is
    /// already running.
    ///
    /// Exactly one refresh request is issued per cycle regardless of how many
    /// callers arrive while it runs; all of them observe the same outcome.
    pub async fn fresh_access_token(&self) -> Result<String, RefreshError> {
        let rx = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            if !state.refreshing {
                state.refreshing = true;
                let inner = Arc::clone(&self.inner);
                tokio::spawn(inner.run_refresh());
            }
            rx
        };

        match rx.await {
            Ok(outcome) => outcome,
            // The coordinator itself went away mid-cycle.
            Err(_) => Err(RefreshError::Interrupted),
        }
    }
}

impl Inner {
    async fn run_refresh(self: Arc<Self>) {
        let outcome = self.execute_refresh().await;

        match &outcome {
            Ok(_) => {
                debug!("Access token refreshed");
                let _ = self.events.send(AuthEvent::CredentialRotated);
            }
            Err(err) => {
                warn!(error = %err, "Refresh failed; clearing session");
                if let Err(store_err) = self.store.clear() {
                    warn!("Failed to clear session file: {store_err}");
                }
                let _ = self.events.send(AuthEvent::ForcedLogout {
                    reason: err.clone(),
                });
            }
        }

        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // Abandoned callers dropped their receiver; nothing owed to them.
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn execute_refresh(&self) -> Result<String, RefreshError> {
        let Some(credential) = self.store.get() else {
            return Err(RefreshError::NoSession);
        };

        debug!("Refreshing access token");
        let body = RefreshRequest {
            refresh_token: credential.refresh_token,
        };
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&body)
            .send()
            .await
            .map_err(|err| RefreshError::Unreachable {
                detail: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        let renewal: RefreshResponse =
            response
                .json()
                .await
                .map_err(|err| RefreshError::Unreachable {
                    detail: err.to_string(),
                })?;

        let expires_at = renewal.expires_at(Utc::now());
        match self.store.renew(renewal.access_token.clone(), expires_at) {
            Ok(Some(_)) => Ok(renewal.access_token),
            // Logged out while the refresh was in flight; the logout wins.
            Ok(None) => Err(RefreshError::NoSession),
            Err(err) => {
                warn!("Failed to persist renewed credential: {err}");
                Ok(renewal.access_token)
            }
        }
    }
}
