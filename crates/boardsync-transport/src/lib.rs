//! Transport abstraction layer for boardsync.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the socket carrying a board session, plus the [`Handshake`] captured when
//! the connection was opened (cookies and query parameters).
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//!
//! The [`memory`] module is always available: an in-process connection pair
//! used to drive connection handlers without a network.

mod error;
mod handshake;
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use handshake::Handshake;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, PendingUpgrade, WebSocketConnection,
    WebSocketTransport,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs across all transports.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique connection ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One unit of inbound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// An application message (text or binary frame payload).
    Message(Vec<u8>),
    /// A control frame (ping or pong) proving the peer is alive.
    Heartbeat,
}

/// Close code and human-readable reason sent when the server hangs up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// RFC 6455 "policy violation".
    pub const POLICY_VIOLATION: u16 = 1008;
    /// RFC 6455 "going away".
    pub const GOING_AWAY: u16 = 1001;

    /// Builds a policy-violation close (used for failed authentication).
    pub fn policy(reason: impl Into<String>) -> Self {
        Self {
            code: Self::POLICY_VIOLATION,
            reason: reason.into(),
        }
    }

    /// Builds a going-away close (used for idle reaping and shutdown).
    pub fn going_away(reason: impl Into<String>) -> Self {
        Self {
            code: Self::GOING_AWAY,
            reason: reason.into(),
        }
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single bidirectional connection.
///
/// Reads and writes are independent: a task blocked in [`recv`](Self::recv)
/// never prevents another task from calling [`send`](Self::send).
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends a text frame to the remote peer.
    fn send(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next inbound frame.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Inbound>, Self::Error>> + Send;

    /// Sends a liveness ping. The peer's answer arrives as
    /// [`Inbound::Heartbeat`].
    fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the connection, optionally telling the peer why.
    fn close(
        &self,
        reason: Option<CloseReason>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns what the client presented when opening the connection.
    fn handshake(&self) -> &Handshake;
}
