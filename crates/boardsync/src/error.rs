//! Unified error type for the boardsync server.

use std::path::PathBuf;

use boardsync_protocol::ProtocolError;
use boardsync_room::RoomError;
use boardsync_session::AuthError;
use boardsync_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors, so handlers and the server loop deal with one type.
#[derive(Debug, thiserror::Error)]
pub enum BoardsyncError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (tokens, identities, store).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A hub-level error (unknown connection, hub stopped).
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Problems with the server configuration, reported at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("token secret is empty; set JWT_SECRET or tokens.secret")]
    MissingSecret,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let wrapped: BoardsyncError = err.into();
        assert!(matches!(wrapped, BoardsyncError::Transport(_)));
        assert!(wrapped.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let wrapped: BoardsyncError = err.into();
        assert!(matches!(wrapped, BoardsyncError::Protocol(_)));
    }

    #[test]
    fn test_from_auth_error() {
        let wrapped: BoardsyncError = AuthError::Unauthenticated.into();
        assert!(matches!(wrapped, BoardsyncError::Auth(_)));
        assert_eq!(wrapped.to_string(), "authentication failed");
    }

    #[test]
    fn test_from_room_error() {
        let wrapped: BoardsyncError = RoomError::Unavailable.into();
        assert!(matches!(wrapped, BoardsyncError::Room(_)));
    }

    #[test]
    fn test_from_config_error() {
        let wrapped: BoardsyncError = ConfigError::MissingSecret.into();
        assert!(matches!(wrapped, BoardsyncError::Config(_)));
        assert!(wrapped.to_string().contains("JWT_SECRET"));
    }
}
