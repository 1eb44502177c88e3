//! Routing of inbound client frames.
//!
//! Every failure here is answered with an `error` event on the same
//! connection; none of them closes it. The `Display` text of
//! [`DispatchError`] is exactly what the client sees.

use std::sync::Arc;

use boardsync_protocol::{
    BoardId, ClientMessage, ClientRequest, Codec, DragBroadcast, Event,
    IdentityId, ProtocolError, ServerMessage, StickerPosition,
};
use boardsync_room::RoomError;
use boardsync_transport::ConnectionId;

use crate::handler::ConnectionState;
use crate::server::ServerState;
use crate::{BoardDirectory, BoardsyncError, StickerPositions};

#[derive(Debug, thiserror::Error)]
pub(crate) enum DispatchError {
    /// Not JSON, not an envelope, or a payload of the wrong shape.
    #[error("Invalid message format")]
    Malformed(#[source] ProtocolError),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("boardId is required")]
    BoardRequired,

    #[error("Failed message")]
    Failed(#[source] BoardsyncError),
}

impl From<RoomError> for DispatchError {
    fn from(e: RoomError) -> Self {
        Self::Failed(e.into())
    }
}

impl DispatchError {
    pub(crate) fn log(&self, conn_id: ConnectionId, identity: IdentityId) {
        match self {
            Self::UnknownEvent(event) => {
                tracing::warn!(%conn_id, %identity, %event, "unknown event");
            }
            Self::Failed(e) => {
                tracing::error!(%conn_id, %identity, error = %e, "failed to handle message");
            }
            Self::Malformed(e) => {
                tracing::debug!(%conn_id, %identity, error = %e, "malformed message");
            }
            Self::BoardRequired => {
                tracing::debug!(%conn_id, %identity, "join without boardId");
            }
        }
    }
}

/// Interprets frames from one connection on behalf of one identity.
pub(crate) struct MessageDispatcher<'a, S, P, B> {
    state: &'a ServerState<S, P, B>,
    conn_id: ConnectionId,
    identity: IdentityId,
}

impl<'a, S, P, B> MessageDispatcher<'a, S, P, B>
where
    B: StickerPositions + BoardDirectory,
{
    pub(crate) fn new(
        state: &'a ServerState<S, P, B>,
        conn_id: ConnectionId,
        identity: IdentityId,
    ) -> Self {
        Self {
            state,
            conn_id,
            identity,
        }
    }

    /// Handles one inbound frame, updating `lifecycle` on join and leave.
    pub(crate) async fn dispatch(
        &self,
        data: &[u8],
        lifecycle: &mut ConnectionState,
    ) -> Result<(), DispatchError> {
        let msg: ClientMessage = self
            .state
            .codec
            .decode(data)
            .map_err(DispatchError::Malformed)?;
        let request = ClientRequest::try_from(msg).map_err(|e| match e {
            ProtocolError::UnknownEvent(event) => {
                DispatchError::UnknownEvent(event)
            }
            other => DispatchError::Malformed(other),
        })?;

        match request {
            ClientRequest::Join(join) => {
                let board = join.board().cloned().ok_or(DispatchError::BoardRequired)?;
                self.state.hub.join(self.conn_id, board.clone()).await?;
                *lifecycle = ConnectionState::Joined(board);
            }
            ClientRequest::Leave => {
                if self.state.hub.leave(self.conn_id).await?.is_some() {
                    *lifecycle = ConnectionState::Authenticated;
                }
            }
            ClientRequest::DragStart(drag) => {
                self.broadcast_drag(Event::DragStart, drag.stickers).await?;
            }
            ClientRequest::DragEnd(drag) => {
                let stickers = drag.stickers.clone();
                let board = self.broadcast_drag(Event::DragEnd, drag.stickers).await?;
                if let Some(board) = board {
                    self.persist(board, stickers);
                }
            }
        }
        Ok(())
    }

    /// Sends `{userId, stickers}` to the current room. Returns the board
    /// it went to; `None` without a room or without stickers.
    async fn broadcast_drag(
        &self,
        event: Event,
        stickers: Vec<StickerPosition>,
    ) -> Result<Option<BoardId>, DispatchError> {
        if stickers.is_empty() {
            return Ok(None);
        }
        let msg = ServerMessage::new(
            event,
            &DragBroadcast {
                user_id: self.identity,
                stickers,
            },
        )
        .map_err(|e| DispatchError::Failed(e.into()))?;
        Ok(self.state.hub.broadcast_from(self.conn_id, &msg).await?)
    }

    /// Persists positions in the background once the broadcast went out,
    /// so a slow store never stalls this connection. A failure is only
    /// logged; peers keep what they were sent.
    fn persist(&self, board: BoardId, stickers: Vec<StickerPosition>) {
        let boards = Arc::clone(&self.state.boards);
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            if let Err(e) = boards.apply_sticker_positions(&stickers).await {
                tracing::error!(
                    %conn_id,
                    %board,
                    count = stickers.len(),
                    error = %e,
                    "failed to persist sticker positions"
                );
            }
        });
    }
}
