//! Services the server consumes but does not own.
//!
//! Board and sticker persistence live elsewhere. The server only needs to
//! persist dragged sticker positions and, advisorily, to ask whether a
//! board exists before auto-joining it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use boardsync_protocol::{BoardId, StickerPosition};
use tokio::sync::Mutex;

/// Error type returned by collaborator services.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Persists sticker positions after a drag ends.
pub trait StickerPositions: Send + Sync + 'static {
    fn apply_sticker_positions(
        &self,
        positions: &[StickerPosition],
    ) -> impl Future<Output = Result<(), CollaboratorError>> + Send;
}

/// Answers whether a board exists.
pub trait BoardDirectory: Send + Sync + 'static {
    fn board_exists(
        &self,
        board: &BoardId,
    ) -> impl Future<Output = Result<bool, CollaboratorError>> + Send;
}

#[derive(Debug, Default)]
struct Boards {
    known: HashSet<BoardId>,
    positions: HashMap<String, StickerPosition>,
}

/// In-process board directory and position sink. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBoards {
    inner: Arc<Mutex<Boards>>,
}

impl MemoryBoards {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_board(&self, board: impl Into<BoardId>) {
        self.inner.lock().await.known.insert(board.into());
    }

    /// Last persisted position of a sticker.
    pub async fn position(&self, sticker_id: &str) -> Option<StickerPosition> {
        self.inner.lock().await.positions.get(sticker_id).cloned()
    }
}

impl StickerPositions for MemoryBoards {
    async fn apply_sticker_positions(
        &self,
        positions: &[StickerPosition],
    ) -> Result<(), CollaboratorError> {
        let mut inner = self.inner.lock().await;
        for position in positions {
            inner
                .positions
                .insert(position.id.clone(), position.clone());
        }
        Ok(())
    }
}

impl BoardDirectory for MemoryBoards {
    async fn board_exists(
        &self,
        board: &BoardId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.inner.lock().await.known.contains(board))
    }
}
