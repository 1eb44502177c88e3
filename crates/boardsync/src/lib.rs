//! # boardsync
//!
//! Real-time collaboration backend for shared sticker boards.
//!
//! Browsers connect over WebSocket, are identified from their session
//! cookies (or handed a fresh anonymous session), auto-join the board named
//! in the `boardId` query parameter, and then exchange drag events with
//! everyone else viewing that board. Mutation services announce committed
//! changes through the [`HubHandle`] returned by [`BoardsyncServer::hub`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use boardsync::prelude::*;
//!
//! # async fn start() -> Result<(), BoardsyncError> {
//! let config = ServerConfig::load()?;
//! let server = BoardsyncServer::builder()
//!     .config(config)
//!     .build(MemoryStore::new(), MemoryIdentities::new(), MemoryBoards::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod collaborators;
mod config;
mod dispatch;
mod error;
mod handler;
mod server;

pub use collaborators::{
    BoardDirectory, CollaboratorError, MemoryBoards, StickerPositions,
};
pub use config::{BIND_ENV, CONFIG_ENV, REDIS_ENV, SECRET_ENV, ServerConfig};
pub use error::{BoardsyncError, ConfigError};
pub use handler::{ConnectionState, UNAUTHORIZED_REASON};
pub use server::{BoardsyncServer, BoardsyncServerBuilder};

pub use boardsync_protocol as protocol;
pub use boardsync_room::HubHandle;
pub use boardsync_session as session;

/// Everything needed to configure, start, and feed a server.
pub mod prelude {
    pub use crate::{
        BoardDirectory, BoardsyncError, BoardsyncServer,
        BoardsyncServerBuilder, ConfigError, MemoryBoards, ServerConfig,
        StickerPositions,
    };
    pub use boardsync_protocol::{BoardEvent, BoardId, Event, IdentityId};
    pub use boardsync_room::{HubConfig, HubHandle, PresencePolicy};
    pub use boardsync_session::{
        Accounts, AuthError, LoginForm, MemoryIdentities, MemoryStore,
        Passwords, Registration, SessionCredentials, TokenConfig,
    };
}
