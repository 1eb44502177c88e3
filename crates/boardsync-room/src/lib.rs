//! Board rooms, presence and broadcast for boardsync.
//!
//! A *room* is the set of live connections viewing one board; *presence*
//! is the set of live connections of one identity. Both live in a
//! [`ConnectionRegistry`] owned by a single hub task ([`spawn_hub`]), and
//! everything else talks to it through a [`HubHandle`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← one task per connection, each holding a HubHandle
//!     ↕
//! Room Layer (this crate)  ← rooms, presence, fan-out
//!     ↕
//! Protocol Layer (below)  ← BoardId, IdentityId, ServerMessage
//! ```

mod broadcast;
mod config;
mod error;
mod hub;
mod registry;

pub use broadcast::Broadcaster;
pub use config::{HubConfig, PresencePolicy};
pub use error::RoomError;
pub use hub::{HubHandle, spawn_hub};
pub use registry::{
    ConnectionRegistry, Detached, PeerReceiver, PeerSender,
};
