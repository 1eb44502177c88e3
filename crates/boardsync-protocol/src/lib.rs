//! Wire protocol for boardsync.
//!
//! This crate defines the language clients and the server speak over a
//! board connection:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`Event`], payloads):
//!   the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding or
//!   interpreting a message.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientRequest / ServerMessage) → Hub
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, Frame, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    BoardAck, BoardEvent, BoardId, ClientMessage, ClientRequest,
    DragBroadcast, DragStickers, Event, IdentityId, JoinBoard, Presence,
    ServerMessage, StickerPosition,
};
