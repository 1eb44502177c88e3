//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The protocol layer doesn't care how messages become bytes; it only needs
//! something implementing [`Codec`]. [`JsonCodec`] is the only codec today:
//! browser clients speak JSON text frames.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A serialized outbound message, shared by every recipient of a broadcast.
///
/// Serializing once and cloning the `Arc` keeps fan-out cost independent of
/// payload size.
pub type Frame = Arc<str>;

/// A codec that can encode Rust types to bytes and decode bytes back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Serializes a value into a text [`Frame`].
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidMessage` if the codec produced bytes
    /// that are not UTF-8.
    fn encode_frame<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Frame, ProtocolError> {
        let bytes = self.encode(value)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            ProtocolError::InvalidMessage("frame is not valid UTF-8".into())
        })?;
        Ok(Arc::from(text))
    }
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use boardsync_protocol::{Codec, Event, JsonCodec, ServerMessage};
///
/// let codec = JsonCodec;
/// let msg = ServerMessage::error("Invalid message format");
/// let frame = codec.encode_frame(&msg).unwrap();
/// assert_eq!(&*frame, r#"{"event":"error","error":"Invalid message format"}"#);
///
/// let decoded: ServerMessage = codec.decode(frame.as_bytes()).unwrap();
/// assert_eq!(decoded.event, Event::Error);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
