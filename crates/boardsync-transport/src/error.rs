//! Errors raised by transports.

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener failed to accept a TCP connection.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The peer did not complete the upgrade handshake in time.
    #[error("handshake with {0} timed out")]
    HandshakeTimeout(std::net::SocketAddr),

    /// The upgrade handshake or a frame exchange failed.
    #[cfg(feature = "websocket")]
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The other side of the connection is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_address() {
        let err = TransportError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_handshake_timeout_names_peer() {
        let addr: std::net::SocketAddr = "10.0.0.7:4000".parse().unwrap();
        let err = TransportError::HandshakeTimeout(addr);
        assert_eq!(err.to_string(), "handshake with 10.0.0.7:4000 timed out");
    }
}
