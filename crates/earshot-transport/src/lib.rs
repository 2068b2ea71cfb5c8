//! Position channel for Earshot.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! how the positional feed is reached, and the [`ChannelManager`] that
//! keeps exactly one channel alive and reconnects it after unexpected
//! closes.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`

mod error;
mod manager;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use manager::{
    ChannelConfig, ChannelEvent, ChannelManager, ChannelState,
    DEFAULT_RECONNECT_DELAY,
};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Identifier of one channel attempt.
///
/// Every call that opens a channel gets a fresh id. Events carry the id
/// of the channel that produced them, so events from a channel that has
/// since been replaced can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Opens channels to the positional feed.
///
/// The returned futures must be `Send` because the manager drives each
/// channel on its own Tokio task. Implementors can still write
/// `async fn connect(&self)`.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Establishes a new channel.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// One open channel delivering raw messages.
pub trait Connection: Send + Sync + 'static {
    /// Receives the next message.
    ///
    /// Returns `Ok(None)` when the channel is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the channel.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
