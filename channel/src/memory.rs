//! In-memory channel transport.
//!
//! Backed by plain mpsc pairs so tests and local development can stand in
//! for the server: script connection refusals, feed inbound frames, observe
//! outbound messages, and drop the connection at will. Dropping a
//! [`MemorySession`] is how a server-side disconnect is simulated.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tether_types::wire::{ClientMessage, InboundFrame};

use crate::transport::{ChannelConnection, ChannelError, ChannelTransport};

struct Shared {
    refusals: Mutex<usize>,
    connects: Mutex<usize>,
    sessions: mpsc::UnboundedSender<MemorySession>,
}

impl Shared {
    fn lock_refusals(&self) -> std::sync::MutexGuard<'_, usize> {
        self.refusals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_connects(&self) -> std::sync::MutexGuard<'_, usize> {
        self.connects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The transport half handed to the channel manager.
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// The scripting half kept by the test or demo harness.
pub struct MemoryControl {
    shared: Arc<Shared>,
    sessions: mpsc::UnboundedReceiver<MemorySession>,
}

/// The server side of one accepted connection.
pub struct MemorySession {
    /// Access token the client presented when it connected.
    pub token: String,
    frames: mpsc::UnboundedSender<InboundFrame>,
    sent: mpsc::UnboundedReceiver<ClientMessage>,
}

struct MemoryConnection {
    frames: mpsc::UnboundedReceiver<InboundFrame>,
    sent: mpsc::UnboundedSender<ClientMessage>,
}

#[must_use]
pub fn memory_transport() -> (MemoryTransport, MemoryControl) {
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        refusals: Mutex::new(0),
        connects: Mutex::new(0),
        sessions: sessions_tx,
    });
    (
        MemoryTransport {
            shared: Arc::clone(&shared),
        },
        MemoryControl {
            shared,
            sessions: sessions_rx,
        },
    )
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn connect(
        &self,
        _url: &str,
        access_token: &str,
    ) -> Result<Box<dyn ChannelConnection>, ChannelError> {
        *self.shared.lock_connects() += 1;
        {
            let mut refusals = self.shared.lock_refusals();
            if *refusals > 0 {
                *refusals -= 1;
                return Err(ChannelError::Connect {
                    detail: "connection refused".into(),
                });
            }
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let session = MemorySession {
            token: access_token.to_owned(),
            frames: frames_tx,
            sent: sent_rx,
        };
        self.shared
            .sessions
            .send(session)
            .map_err(|_| ChannelError::Connect {
                detail: "nobody listening".into(),
            })?;
        Ok(Box::new(MemoryConnection {
            frames: frames_rx,
            sent: sent_tx,
        }))
    }
}

impl MemoryControl {
    /// Make the next `count` connection attempts fail.
    pub fn refuse_next(&self, count: usize) {
        *self.shared.lock_refusals() += count;
    }

    /// Total connection attempts observed, refused ones included.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        *self.shared.lock_connects()
    }

    /// Wait for the next accepted connection. `None` once the transport
    /// itself is gone.
    pub async fn accepted(&mut self) -> Option<MemorySession> {
        self.sessions.recv().await
    }
}

impl MemorySession {
    /// Deliver a frame to the client. Lost silently if the client side has
    /// already gone away.
    pub fn push(&self, frame: InboundFrame) {
        let _ = self.frames.send(frame);
    }

    /// Wait for the next message the client sent. `None` once the client
    /// side has closed.
    pub async fn sent(&mut self) -> Option<ClientMessage> {
        self.sent.recv().await
    }

    /// `true` while the client side of this connection is still alive.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.frames.is_closed()
    }
}

#[async_trait]
impl ChannelConnection for MemoryConnection {
    async fn next_frame(&mut self) -> Result<Option<InboundFrame>, ChannelError> {
        Ok(self.frames.recv().await)
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ChannelError> {
        self.sent
            .send(message.clone())
            .map_err(|_| ChannelError::Closed)
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}
