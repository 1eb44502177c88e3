//! Error types for the room layer.

use boardsync_transport::ConnectionId;

/// Errors that can occur during hub operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The connection was never registered with the hub, or has already
    /// been removed.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// The hub's command channel is closed (the hub shut down).
    #[error("hub is unavailable")]
    Unavailable,

    /// A frame could not be serialized.
    #[error(transparent)]
    Protocol(#[from] boardsync_protocol::ProtocolError),
}
