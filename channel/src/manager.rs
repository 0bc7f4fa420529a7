//! Connection lifecycle for the push channel.
//!
//! A spawned task owns the connection and its state machine; the app talks
//! to it through a [`ChannelHandle`]. Connectivity is published on a watch
//! channel so any number of observers can follow along without polling.
//!
//! Reconnection is deliberately plain: a fixed interval between attempts and
//! a hard cap, after which the channel parks in the failed state until the
//! user disconnects and reconnects by hand. The app keeps working without
//! the channel either way.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use tether_types::wire::{ClientMessage, InboundFrame};
use tether_types::{CacheKey, ConnectionState};

use crate::classify::{Classified, classify};
use crate::dispatch::{AlertRequest, SideEffects};
use crate::registry::NotificationRegistry;
use crate::transport::{ChannelConnection, ChannelError, ChannelTransport};

/// Supplies the access token presented when the channel (re)connects.
///
/// Implemented for any `Fn() -> Option<String>` closure, so callers can
/// wire in their credential store without this crate knowing about it.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// How reconnection behaves after the connection is lost.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(3),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based). Constant across
    /// attempts.
    #[must_use]
    pub const fn delay_for(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

enum Command {
    Connect,
    Disconnect,
    CredentialRotated,
}

/// What a connected session ended with.
enum Drive {
    Disconnect,
    ConnectionLost,
    Rotate,
    Shutdown,
}

/// Facade over the spawned channel task. Cheap to clone.
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
}

impl ChannelHandle {
    /// Begin connecting. Honored only while disconnected.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Tear down the connection and cancel any pending reconnect. This is
    /// also the only way out of the failed state.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Tell the channel the credential changed. Reconnects only if the live
    /// connection was opened with an older token.
    pub fn credential_rotated(&self) {
        let _ = self.commands.send(Command::CredentialRotated);
    }

    /// Watch endpoint for the connection state.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }
}

/// Everything the embedding application consumes from the channel.
pub struct Collaborators {
    pub registry: NotificationRegistry,
    pub alerts: mpsc::UnboundedReceiver<AlertRequest>,
    pub invalidations: mpsc::UnboundedReceiver<Vec<CacheKey>>,
}

/// Owns the channel state machine until [`ChannelManager::spawn`] hands it
/// to its task.
pub struct ChannelManager {
    transport: Arc<dyn ChannelTransport>,
    url: String,
    tokens: Arc<dyn TokenSource>,
    registry: NotificationRegistry,
    acks: mpsc::UnboundedReceiver<ClientMessage>,
    effects: SideEffects,
    policy: ReconnectPolicy,
}

impl ChannelManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        policy: ReconnectPolicy,
    ) -> (Self, Collaborators) {
        let (registry, acks) = NotificationRegistry::new();
        let (effects, receivers) = SideEffects::new();
        let collaborators = Collaborators {
            registry: registry.clone(),
            alerts: receivers.alerts,
            invalidations: receivers.invalidations,
        };
        (
            Self {
                transport,
                url: url.into(),
                tokens,
                registry,
                acks,
                effects,
                policy,
            },
            collaborators,
        )
    }

    /// Start the channel task. It runs until every handle is dropped.
    #[must_use]
    pub fn spawn(self) -> ChannelHandle {
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(status_tx, commands_rx));
        ChannelHandle {
            commands: commands_tx,
            status: status_rx,
        }
    }

    async fn run(
        self,
        status: watch::Sender<ConnectionState>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let Self {
            transport,
            url,
            tokens,
            registry,
            mut acks,
            effects,
            policy,
        } = self;
        let mut attempts: u32 = 0;

        'idle: loop {
            // Disconnected or failed: nothing to do until told otherwise.
            let Some(command) = commands.recv().await else {
                return;
            };
            match command {
                Command::Connect if *status.borrow() == ConnectionState::Disconnected => {
                    attempts = 0;
                }
                Command::Connect => {
                    debug!("connect ignored; channel is in the failed state");
                    continue 'idle;
                }
                Command::Disconnect => {
                    attempts = 0;
                    set_state(&status, ConnectionState::Disconnected);
                    continue 'idle;
                }
                Command::CredentialRotated => continue 'idle,
            }

            'connecting: loop {
                set_state(&status, ConnectionState::Connecting);
                let opened = match tokens.access_token() {
                    Some(token) => transport
                        .connect(&url, &token)
                        .await
                        .map(|connection| (connection, token)),
                    None => Err(ChannelError::Connect {
                        detail: "no stored credential".into(),
                    }),
                };

                match opened {
                    Ok((mut connection, token)) => {
                        attempts = 0;
                        // Acks queued while offline are stale; the snapshot
                        // reconciles read state instead.
                        while acks.try_recv().is_ok() {}
                        set_state(&status, ConnectionState::Connected);
                        let outcome = drive_connected(
                            &mut *connection,
                            &token,
                            tokens.as_ref(),
                            &mut commands,
                            &mut acks,
                            &registry,
                            &effects,
                        )
                        .await;
                        connection.close().await;
                        match outcome {
                            Drive::Disconnect => {
                                attempts = 0;
                                set_state(&status, ConnectionState::Disconnected);
                                continue 'idle;
                            }
                            Drive::Rotate => continue 'connecting,
                            Drive::ConnectionLost => {}
                            Drive::Shutdown => return,
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, attempt = attempts + 1, "Channel connection failed");
                    }
                }

                attempts += 1;
                if attempts >= policy.max_attempts {
                    error!(attempts, "Channel reconnection exhausted; giving up");
                    set_state(&status, ConnectionState::Failed);
                    continue 'idle;
                }

                set_state(&status, ConnectionState::Reconnecting);
                let delay = tokio::time::sleep(policy.delay_for(attempts));
                tokio::pin!(delay);
                loop {
                    tokio::select! {
                        () = &mut delay => continue 'connecting,
                        command = commands.recv() => match command {
                            None => return,
                            Some(Command::Disconnect) => {
                                attempts = 0;
                                set_state(&status, ConnectionState::Disconnected);
                                continue 'idle;
                            }
                            Some(Command::Connect) => {
                                debug!("connect ignored; reconnect already scheduled");
                            }
                            Some(Command::CredentialRotated) => {}
                        },
                    }
                }
            }
        }
    }
}

async fn drive_connected(
    connection: &mut dyn ChannelConnection,
    connected_token: &str,
    tokens: &dyn TokenSource,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    acks: &mut mpsc::UnboundedReceiver<ClientMessage>,
    registry: &NotificationRegistry,
    effects: &SideEffects,
) -> Drive {
    if let Err(err) = connection
        .send(&ClientMessage::RequestInitialNotifications)
        .await
    {
        warn!(error = %err, "Could not request the notification snapshot");
        return Drive::ConnectionLost;
    }

    loop {
        tokio::select! {
            frame = connection.next_frame() => match frame {
                Ok(Some(InboundFrame::Snapshot(items))) => {
                    debug!(count = items.len(), "Hydrating notifications from snapshot");
                    let notifications = items
                        .iter()
                        .map(|item| classify(item).notification)
                        .collect();
                    registry.hydrate(notifications);
                }
                Ok(Some(InboundFrame::Event(event))) => {
                    let Classified { notification, plan } = classify(&event);
                    debug!(kind = notification.kind().as_str(), "Channel event");
                    effects.dispatch(&notification, plan);
                    registry.ingest(notification);
                }
                Ok(None) => {
                    info!("Channel closed by the server");
                    return Drive::ConnectionLost;
                }
                Err(err) => {
                    warn!(error = %err, "Channel read failed");
                    return Drive::ConnectionLost;
                }
            },
            Some(message) = acks.recv() => {
                if let Err(err) = connection.send(&message).await {
                    warn!(error = %err, "Could not send acknowledgement");
                    return Drive::ConnectionLost;
                }
            },
            command = commands.recv() => match command {
                None => return Drive::Shutdown,
                Some(Command::Disconnect) => return Drive::Disconnect,
                Some(Command::Connect) => {
                    debug!("connect ignored; channel already connected");
                }
                Some(Command::CredentialRotated) => {
                    if tokens.access_token().as_deref() != Some(connected_token) {
                        info!("Credential rotated; reconnecting the channel");
                        return Drive::Rotate;
                    }
                }
            },
        }
    }
}

fn set_state(status: &watch::Sender<ConnectionState>, next: ConnectionState) {
    status.send_if_modified(|state| {
        if *state == next {
            return false;
        }
        debug!(from = state.as_str(), to = next.as_str(), "Channel state");
        *state = next;
        true
    });
}
