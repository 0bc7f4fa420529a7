//! Transport seam for the push channel.
//!
//! The channel manager speaks to the server only through these traits. The
//! production implementation lives in [`crate::ws`]; an in-memory one for
//! tests and local development lives in [`crate::memory`].

use async_trait::async_trait;
use thiserror::Error;

use tether_types::wire::{ClientMessage, InboundFrame};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("could not open the channel: {detail}")]
    Connect { detail: String },
    #[error("channel handshake timed out")]
    HandshakeTimeout,
    #[error("channel closed by the server")]
    Closed,
    #[error("channel transport failed: {detail}")]
    Io { detail: String },
}

/// One live connection to the push endpoint.
#[async_trait]
pub trait ChannelConnection: Send {
    /// Wait for the next inbound frame. `Ok(None)` means the server closed
    /// the connection cleanly.
    async fn next_frame(&mut self) -> Result<Option<InboundFrame>, ChannelError>;

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ChannelError>;

    /// Best-effort close; errors during teardown are not interesting.
    async fn close(&mut self);
}

/// Opens channel connections.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<Box<dyn ChannelConnection>, ChannelError>;
}
