//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or interpreting a
/// message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes are not a well-formed message envelope.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope parsed, but names an event this server does not accept.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The event is known but its `data` does not fit.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// The message is invalid for some other protocol-level reason.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
