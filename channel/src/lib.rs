//! Reconnecting push channel with typed notification handling.
//!
//! # Architecture
//!
//! A spawned manager task owns the connection and its lifecycle state
//! machine ([`manager`]). Inbound frames are classified into typed
//! notifications plus side-effect plans ([`classify`]), recorded in a
//! shared registry with read tracking ([`registry`]), and forwarded to the
//! embedding application as alert and cache-invalidation messages
//! ([`dispatch`]). The server sits behind a transport seam ([`transport`])
//! with a production WebSocket implementation ([`ws`]) and an in-memory one
//! for tests and local development ([`memory`]).

pub mod classify;
pub mod dispatch;
pub mod manager;
pub mod memory;
pub mod registry;
pub mod transport;
pub mod ws;

pub use classify::{Classified, classify, plan_for};
pub use dispatch::{AlertRequest, SideEffectReceivers, SideEffects};
pub use manager::{ChannelHandle, ChannelManager, Collaborators, ReconnectPolicy, TokenSource};
pub use registry::NotificationRegistry;
pub use transport::{ChannelConnection, ChannelError, ChannelTransport};
pub use ws::WsTransport;
