//! In-memory bookkeeping of rooms and presence.
//!
//! The registry answers two questions: which connections are looking at a
//! board (rooms), and which connections belong to an identity (presence).
//! It does no I/O and has no locks; the hub task owns it exclusively, so
//! every read and the mutation it informs happen in one step.
//!
//! Invariants kept here:
//! - a connection is in at most one room at a time
//! - a room entry exists only while it has members
//! - a presence entry exists only while the identity has a live connection

use std::collections::{HashMap, HashSet};

use boardsync_protocol::{BoardId, Frame, IdentityId};
use boardsync_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::RoomError;

/// Outbound queue of one connection. The connection task drains it.
///
/// Bounded: the hub never waits on a slow reader, it drops the frame
/// instead.
pub type PeerSender = mpsc::Sender<Frame>;

/// Receiving side of a [`PeerSender`].
pub type PeerReceiver = mpsc::Receiver<Frame>;

#[derive(Debug)]
struct Peer {
    identity: IdentityId,
    board: Option<BoardId>,
    sender: PeerSender,
}

/// What was left behind when a connection was detached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    pub identity: IdentityId,
    pub board: Option<BoardId>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    rooms: HashMap<BoardId, HashSet<ConnectionId>>,
    presence: HashMap<IdentityId, HashSet<ConnectionId>>,
    peers: HashMap<ConnectionId, Peer>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- connections ------------------------------------------------------

    /// Registers a connection's identity and outbound queue. It starts in
    /// no room and without presence.
    pub fn attach(
        &mut self,
        conn: ConnectionId,
        identity: IdentityId,
        sender: PeerSender,
    ) {
        self.peers.insert(
            conn,
            Peer {
                identity,
                board: None,
                sender,
            },
        );
    }

    /// Forgets a connection, removing it from its room. Presence is left to
    /// [`remove_presence`](Self::remove_presence).
    pub fn detach(&mut self, conn: ConnectionId) -> Option<Detached> {
        let board = self.leave_room(conn);
        let peer = self.peers.remove(&conn)?;
        Some(Detached {
            identity: peer.identity,
            board,
        })
    }

    pub fn identity_of(&self, conn: ConnectionId) -> Option<IdentityId> {
        self.peers.get(&conn).map(|peer| peer.identity)
    }

    pub fn board_of(&self, conn: ConnectionId) -> Option<&BoardId> {
        self.peers.get(&conn)?.board.as_ref()
    }

    pub fn sender(&self, conn: ConnectionId) -> Option<&PeerSender> {
        self.peers.get(&conn).map(|peer| &peer.sender)
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    // -- rooms ------------------------------------------------------------

    /// Moves a connection into `board`'s room, leaving its previous room
    /// first. Returns the previous board, if any.
    pub fn join_room(
        &mut self,
        conn: ConnectionId,
        board: BoardId,
    ) -> Result<Option<BoardId>, RoomError> {
        if !self.peers.contains_key(&conn) {
            return Err(RoomError::UnknownConnection(conn));
        }
        let previous = self.leave_room(conn);

        self.rooms.entry(board.clone()).or_default().insert(conn);
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.board = Some(board);
        }
        Ok(previous)
    }

    /// Removes a connection from its current room, deleting the room once
    /// empty. Returns the board it left, if it was in one.
    pub fn leave_room(&mut self, conn: ConnectionId) -> Option<BoardId> {
        let board = self.peers.get_mut(&conn)?.board.take()?;
        if let Some(members) = self.rooms.get_mut(&board) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(&board);
            }
        }
        Some(board)
    }

    pub fn room(&self, board: &BoardId) -> Option<&HashSet<ConnectionId>> {
        self.rooms.get(board)
    }

    /// Boards that currently have at least one connection.
    pub fn boards(&self) -> impl Iterator<Item = &BoardId> {
        self.rooms.keys()
    }

    /// Boards the identity's connections are currently in.
    pub fn boards_of(&self, identity: IdentityId) -> HashSet<BoardId> {
        self.presence
            .get(&identity)
            .into_iter()
            .flatten()
            .filter_map(|conn| self.board_of(*conn).cloned())
            .collect()
    }

    // -- presence ---------------------------------------------------------

    /// Records a live connection for `identity`. Returns `true` if it is
    /// the identity's first one (it just came online).
    pub fn add_presence(
        &mut self,
        identity: IdentityId,
        conn: ConnectionId,
    ) -> bool {
        let connections = self.presence.entry(identity).or_default();
        let first = connections.is_empty();
        connections.insert(conn);
        first
    }

    /// Drops a connection from `identity`'s presence. Returns `true` if
    /// that emptied the set (it just went offline).
    pub fn remove_presence(
        &mut self,
        identity: IdentityId,
        conn: ConnectionId,
    ) -> bool {
        let Some(connections) = self.presence.get_mut(&identity) else {
            return false;
        };
        connections.remove(&conn);
        if connections.is_empty() {
            self.presence.remove(&identity);
            true
        } else {
            false
        }
    }

    pub fn presence(
        &self,
        identity: IdentityId,
    ) -> Option<&HashSet<ConnectionId>> {
        self.presence.get(&identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached(
        registry: &mut ConnectionRegistry,
        identity: IdentityId,
    ) -> (ConnectionId, PeerReceiver) {
        let conn = ConnectionId::next();
        let (tx, rx) = mpsc::channel(8);
        registry.attach(conn, identity, tx);
        (conn, rx)
    }

    fn board(id: &str) -> BoardId {
        BoardId::new(id)
    }

    #[test]
    fn test_join_room_moves_connection_and_deletes_empty_room() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = attached(&mut registry, IdentityId::new_v4());

        assert_eq!(registry.join_room(conn, board("b1")).unwrap(), None);
        assert!(registry.room(&board("b1")).unwrap().contains(&conn));

        let previous = registry.join_room(conn, board("b2")).unwrap();
        assert_eq!(previous, Some(board("b1")));
        assert!(registry.room(&board("b1")).is_none());
        assert!(registry.room(&board("b2")).unwrap().contains(&conn));
        assert_eq!(registry.board_of(conn), Some(&board("b2")));
    }

    #[test]
    fn test_join_room_same_board_twice_keeps_single_membership() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = attached(&mut registry, IdentityId::new_v4());
        registry.join_room(conn, board("b1")).unwrap();
        registry.join_room(conn, board("b1")).unwrap();
        assert_eq!(registry.room(&board("b1")).unwrap().len(), 1);
    }

    #[test]
    fn test_join_room_unknown_connection_is_error() {
        let mut registry = ConnectionRegistry::new();
        let result = registry.join_room(ConnectionId::new(999), board("b1"));
        assert!(matches!(result, Err(RoomError::UnknownConnection(_))));
        assert!(registry.room(&board("b1")).is_none());
    }

    #[test]
    fn test_leave_room_without_room_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = attached(&mut registry, IdentityId::new_v4());
        assert_eq!(registry.leave_room(conn), None);
    }

    #[test]
    fn test_leave_room_keeps_room_with_other_members() {
        let mut registry = ConnectionRegistry::new();
        let (a, _ra) = attached(&mut registry, IdentityId::new_v4());
        let (b, _rb) = attached(&mut registry, IdentityId::new_v4());
        registry.join_room(a, board("b1")).unwrap();
        registry.join_room(b, board("b1")).unwrap();

        assert_eq!(registry.leave_room(a), Some(board("b1")));
        let members = registry.room(&board("b1")).unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains(&b));
    }

    #[test]
    fn test_presence_first_and_last_connection() {
        let mut registry = ConnectionRegistry::new();
        let user = IdentityId::new_v4();
        let (a, _ra) = attached(&mut registry, user);
        let (b, _rb) = attached(&mut registry, user);

        assert!(registry.add_presence(user, a));
        assert!(!registry.add_presence(user, b));
        assert_eq!(registry.presence(user).unwrap().len(), 2);

        assert!(!registry.remove_presence(user, a));
        assert!(registry.remove_presence(user, b));
        assert!(registry.presence(user).is_none());
        // Removing again is harmless.
        assert!(!registry.remove_presence(user, b));
    }

    #[test]
    fn test_detach_leaves_room_and_reports_board() {
        let mut registry = ConnectionRegistry::new();
        let user = IdentityId::new_v4();
        let (conn, _rx) = attached(&mut registry, user);
        registry.join_room(conn, board("b1")).unwrap();

        let detached = registry.detach(conn).unwrap();
        assert_eq!(detached.identity, user);
        assert_eq!(detached.board, Some(board("b1")));
        assert!(registry.room(&board("b1")).is_none());
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.detach(conn).is_none());
    }

    #[test]
    fn test_boards_of_collects_rooms_of_every_connection() {
        let mut registry = ConnectionRegistry::new();
        let user = IdentityId::new_v4();
        let (a, _ra) = attached(&mut registry, user);
        let (b, _rb) = attached(&mut registry, user);
        registry.add_presence(user, a);
        registry.add_presence(user, b);
        registry.join_room(a, board("b1")).unwrap();
        registry.join_room(b, board("b2")).unwrap();

        let boards = registry.boards_of(user);
        assert_eq!(boards.len(), 2);
        assert!(boards.contains(&board("b1")) && boards.contains(&board("b2")));
    }
}
