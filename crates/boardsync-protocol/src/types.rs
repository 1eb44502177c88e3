//! Core protocol types for boardsync's wire format.
//!
//! Every type here travels "on the wire": clients send a
//! [`ClientMessage`] envelope `{event, data?}`, the server answers with
//! [`ServerMessage`] envelopes `{event, payload?, error?}`. Field names are
//! camelCase on the wire to match the browser client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user, anonymous or authorized.
///
/// Serializes as the bare UUID string (`#[serde(transparent)]`), which is
/// also how it appears in the `user_id` cookie and in token subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    /// Generates a fresh random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdentityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of a board. Boards are owned by an external service, so the
/// id is kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub String);

impl BoardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoardId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for BoardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Event vocabulary
// ---------------------------------------------------------------------------

/// Every event name that appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    #[serde(rename = "sticker:create")]
    StickerCreate,
    #[serde(rename = "sticker:update")]
    StickerUpdate,
    #[serde(rename = "sticker:delete")]
    StickerDelete,
    /// Ephemeral: stickers are being dragged, nothing is persisted.
    #[serde(rename = "stickers:drag:start")]
    DragStart,
    /// Committed: the drag finished and positions get persisted.
    #[serde(rename = "stickers:drag:end")]
    DragEnd,
    #[serde(rename = "board:delete")]
    BoardDelete,
    #[serde(rename = "user:online")]
    UserOnline,
    #[serde(rename = "user:join")]
    UserJoin,
    #[serde(rename = "user:left")]
    UserLeft,
    #[serde(rename = "error")]
    Error,
    /// Server-only: freshly issued credentials for an anonymous session.
    #[serde(rename = "session:issued")]
    SessionIssued,
}

impl Event {
    pub const ALL: [Event; 11] = [
        Event::StickerCreate,
        Event::StickerUpdate,
        Event::StickerDelete,
        Event::DragStart,
        Event::DragEnd,
        Event::BoardDelete,
        Event::UserOnline,
        Event::UserJoin,
        Event::UserLeft,
        Event::Error,
        Event::SessionIssued,
    ];

    /// The wire name of this event.
    pub fn as_str(self) -> &'static str {
        match self {
            Event::StickerCreate => "sticker:create",
            Event::StickerUpdate => "sticker:update",
            Event::StickerDelete => "sticker:delete",
            Event::DragStart => "stickers:drag:start",
            Event::DragEnd => "stickers:drag:end",
            Event::BoardDelete => "board:delete",
            Event::UserOnline => "user:online",
            Event::UserJoin => "user:join",
            Event::UserLeft => "user:left",
            Event::Error => "error",
            Event::SessionIssued => "session:issued",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownEvent(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Position of one sticker, as sent by a client while dragging.
///
/// Older clients send `positionX`, `positionY` and `index`; those are
/// accepted on input. Output always uses `x`, `y` and `zIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerPosition {
    pub id: String,
    #[serde(alias = "positionX")]
    pub x: f64,
    #[serde(alias = "positionY")]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, alias = "index", skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl StickerPosition {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width: None,
            height: None,
            z_index: None,
        }
    }
}

/// `data` of a `user:join` request. The board id is optional here so a
/// missing one can be answered with a precise error instead of a generic
/// decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBoard {
    #[serde(default)]
    pub board_id: Option<BoardId>,
}

impl JoinBoard {
    /// The requested board, if one was named and is non-empty.
    pub fn board(&self) -> Option<&BoardId> {
        self.board_id.as_ref().filter(|id| !id.as_str().is_empty())
    }
}

/// `data` of both drag events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DragStickers {
    #[serde(default)]
    pub stickers: Vec<StickerPosition>,
}

/// Payload of `user:join` / `user:left` acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardAck {
    pub board_id: BoardId,
}

/// Payload of `user:online`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: IdentityId,
    pub is_online: bool,
}

/// Payload of a drag broadcast: who is dragging and where the stickers are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragBroadcast {
    pub user_id: IdentityId,
    pub stickers: Vec<StickerPosition>,
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// The raw envelope every client frame must match.
///
/// `event` stays a string at this stage so an unrecognized name can be
/// reported back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ClientMessage {
    pub fn new(event: Event, data: Option<Value>) -> Self {
        Self {
            event: event.as_str().to_owned(),
            data,
        }
    }
}

/// A client frame interpreted against the events clients may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Join(JoinBoard),
    Leave,
    DragStart(DragStickers),
    DragEnd(DragStickers),
}

impl TryFrom<ClientMessage> for ClientRequest {
    type Error = ProtocolError;

    /// Events the server only emits (`sticker:*`, `user:online`, ...) are
    /// rejected as unknown, same as names outside the vocabulary.
    fn try_from(msg: ClientMessage) -> Result<Self, Self::Error> {
        let event = match msg.event.parse::<Event>() {
            Ok(event) => event,
            Err(_) => return Err(ProtocolError::UnknownEvent(msg.event)),
        };
        match event {
            Event::UserJoin => Ok(Self::Join(payload(event, msg.data)?)),
            Event::UserLeft => Ok(Self::Leave),
            Event::DragStart => Ok(Self::DragStart(payload(event, msg.data)?)),
            Event::DragEnd => Ok(Self::DragEnd(payload(event, msg.data)?)),
            _ => Err(ProtocolError::UnknownEvent(msg.event)),
        }
    }
}

/// Decodes `data` into `T`; absent or `null` data yields `T::default()`.
fn payload<T>(event: Event, data: Option<Value>) -> Result<T, ProtocolError>
where
    T: Default + serde::de::DeserializeOwned,
{
    match data {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            ProtocolError::InvalidPayload {
                event: event.as_str().to_owned(),
                reason: e.to_string(),
            }
        }),
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A frame sent by the server. `payload` is omitted on pure error frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    /// Builds a frame carrying `payload`.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the payload cannot be turned into
    /// JSON (for example a map with non-string keys).
    pub fn new<T: Serialize>(
        event: Event,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let payload =
            serde_json::to_value(payload).map_err(ProtocolError::Encode)?;
        Ok(Self::with_value(event, payload))
    }

    /// Builds a frame from an already-converted payload.
    pub fn with_value(event: Event, payload: Value) -> Self {
        Self {
            event,
            payload: Some(payload),
            error: None,
        }
    }

    /// Builds an `error` frame with no payload.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event: Event::Error,
            payload: None,
            error: Some(message.into()),
        }
    }
}

/// A committed change announced by a mutation service after its write
/// succeeded. The hub turns it into a broadcast on the affected board.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    StickerCreated { board_id: BoardId, sticker: Value },
    StickerUpdated { board_id: BoardId, sticker: Value },
    StickerDeleted { board_id: BoardId, sticker: Value },
    BoardDeleted {
        board_id: BoardId,
        user_id: Option<IdentityId>,
    },
}

impl BoardEvent {
    /// The board whose room receives this event.
    pub fn board_id(&self) -> &BoardId {
        match self {
            BoardEvent::StickerCreated { board_id, .. }
            | BoardEvent::StickerUpdated { board_id, .. }
            | BoardEvent::StickerDeleted { board_id, .. }
            | BoardEvent::BoardDeleted { board_id, .. } => board_id,
        }
    }

    /// The wire event this change is announced as.
    pub fn event(&self) -> Event {
        match self {
            BoardEvent::StickerCreated { .. } => Event::StickerCreate,
            BoardEvent::StickerUpdated { .. } => Event::StickerUpdate,
            BoardEvent::StickerDeleted { .. } => Event::StickerDelete,
            BoardEvent::BoardDeleted { .. } => Event::BoardDelete,
        }
    }

    /// Converts into the frame broadcast to the board's room.
    pub fn into_message(self) -> ServerMessage {
        let event = self.event();
        let payload = match self {
            BoardEvent::StickerCreated { sticker, .. }
            | BoardEvent::StickerUpdated { sticker, .. }
            | BoardEvent::StickerDeleted { sticker, .. } => sticker,
            BoardEvent::BoardDeleted { board_id, user_id } => {
                serde_json::json!({ "id": board_id, "userId": user_id })
            }
        };
        ServerMessage::with_value(event, payload)
    }
}
