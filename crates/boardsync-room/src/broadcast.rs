//! Fan-out of frames to rooms.

use boardsync_protocol::{
    BoardId, Codec, Event, Frame, IdentityId, JsonCodec, Presence,
    ServerMessage,
};
use tokio::sync::mpsc::error::TrySendError;

use crate::{ConnectionRegistry, PresencePolicy, RoomError};

/// Sends frames to the members of rooms in a [`ConnectionRegistry`].
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    policy: PresencePolicy,
    codec: JsonCodec,
}

impl Broadcaster {
    pub fn new(policy: PresencePolicy) -> Self {
        Self {
            policy,
            codec: JsonCodec,
        }
    }

    pub fn policy(&self) -> PresencePolicy {
        self.policy
    }

    /// Serializes a message once into a shareable frame.
    pub fn frame(&self, msg: &ServerMessage) -> Result<Frame, RoomError> {
        Ok(self.codec.encode_frame(msg)?)
    }

    /// Queues `frame` to every open connection in `board`'s room.
    ///
    /// An absent room is a no-op. A connection whose queue is closed or
    /// full is skipped and the rest still receive the frame. Returns how
    /// many connections it was queued to.
    pub fn broadcast_to_room(
        &self,
        registry: &ConnectionRegistry,
        board: &BoardId,
        frame: &Frame,
    ) -> usize {
        let Some(members) = registry.room(board) else {
            tracing::debug!(%board, "board room not found");
            return 0;
        };

        let mut sent = 0;
        for conn in members {
            let Some(sender) = registry.sender(*conn) else {
                continue;
            };
            match sender.try_send(Frame::clone(frame)) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%board, %conn, "outbound queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%board, %conn, "outbound queue closed");
                }
            }
        }

        tracing::debug!(
            %board,
            clients = members.len(),
            sent,
            "broadcast to board"
        );
        sent
    }

    /// Announces that `identity` came online or went offline.
    ///
    /// `last_board` is the room its last connection was in before leaving;
    /// the shared-rooms policy uses it for the offline transition, when
    /// the identity is no longer in any room. Returns how many connections
    /// the event was queued to.
    pub fn broadcast_presence(
        &self,
        registry: &ConnectionRegistry,
        identity: IdentityId,
        is_online: bool,
        last_board: Option<&BoardId>,
    ) -> Result<usize, RoomError> {
        let msg = ServerMessage::new(
            Event::UserOnline,
            &Presence {
                user_id: identity,
                is_online,
            },
        )?;
        let frame = self.frame(&msg)?;

        let targets: Vec<BoardId> = match self.policy {
            PresencePolicy::AllRooms => registry.boards().cloned().collect(),
            PresencePolicy::SharedRooms => {
                let mut boards = registry.boards_of(identity);
                if let Some(board) = last_board {
                    boards.insert(board.clone());
                }
                boards.into_iter().collect()
            }
        };

        Ok(targets
            .iter()
            .map(|board| self.broadcast_to_room(registry, board, &frame))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use boardsync_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;
    use crate::PeerReceiver;

    struct Member {
        conn: ConnectionId,
        rx: PeerReceiver,
    }

    fn member(
        registry: &mut ConnectionRegistry,
        identity: IdentityId,
        board: Option<&str>,
    ) -> Member {
        member_with_queue(registry, identity, board, 8)
    }

    fn member_with_queue(
        registry: &mut ConnectionRegistry,
        identity: IdentityId,
        board: Option<&str>,
        capacity: usize,
    ) -> Member {
        let conn = ConnectionId::next();
        let (tx, rx) = mpsc::channel(capacity);
        registry.attach(conn, identity, tx);
        registry.add_presence(identity, conn);
        if let Some(board) = board {
            registry.join_room(conn, BoardId::new(board)).unwrap();
        }
        Member { conn, rx }
    }

    fn frame(text: &str) -> Frame {
        Frame::from(text)
    }

    #[test]
    fn test_broadcast_to_room_absent_room_is_noop() {
        let registry = ConnectionRegistry::new();
        let sent = Broadcaster::default().broadcast_to_room(
            &registry,
            &BoardId::new("nobody"),
            &frame("x"),
        );
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_broadcast_to_room_reaches_only_members() {
        let mut registry = ConnectionRegistry::new();
        let mut a = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let mut b = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let mut c = member(&mut registry, IdentityId::new_v4(), Some("b2"));

        let sent = Broadcaster::default().broadcast_to_room(
            &registry,
            &BoardId::new("b1"),
            &frame("hello"),
        );
        assert_eq!(sent, 2);
        assert_eq!(&*a.rx.try_recv().unwrap(), "hello");
        assert_eq!(&*b.rx.try_recv().unwrap(), "hello");
        assert!(c.rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_room_closed_member_does_not_abort_fanout() {
        let mut registry = ConnectionRegistry::new();
        let dead = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let mut live = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        drop(dead.rx);

        let sent = Broadcaster::default().broadcast_to_room(
            &registry,
            &BoardId::new("b1"),
            &frame("still here"),
        );
        assert_eq!(sent, 1);
        assert_eq!(&*live.rx.try_recv().unwrap(), "still here");
        assert!(registry.room(&BoardId::new("b1")).unwrap().contains(&dead.conn));
    }

    #[test]
    fn test_broadcast_to_room_full_member_is_skipped() {
        let mut registry = ConnectionRegistry::new();
        let mut slow =
            member_with_queue(&mut registry, IdentityId::new_v4(), Some("b1"), 1);
        let mut fast = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let broadcaster = Broadcaster::default();
        let board = BoardId::new("b1");

        assert_eq!(broadcaster.broadcast_to_room(&registry, &board, &frame("one")), 2);
        assert_eq!(broadcaster.broadcast_to_room(&registry, &board, &frame("two")), 1);

        assert_eq!(&*slow.rx.try_recv().unwrap(), "one");
        assert!(slow.rx.try_recv().is_err());
        assert_eq!(&*fast.rx.try_recv().unwrap(), "one");
        assert_eq!(&*fast.rx.try_recv().unwrap(), "two");
        assert!(registry.room(&board).unwrap().contains(&slow.conn));
    }

    #[test]
    fn test_broadcast_presence_all_rooms_reaches_every_room() {
        let mut registry = ConnectionRegistry::new();
        let user = IdentityId::new_v4();
        let mut b1 = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let mut b2 = member(&mut registry, IdentityId::new_v4(), Some("b2"));
        member(&mut registry, user, None);

        let sent = Broadcaster::new(PresencePolicy::AllRooms)
            .broadcast_presence(&registry, user, true, None)
            .unwrap();
        assert_eq!(sent, 2);

        let msg: serde_json::Value =
            serde_json::from_str(&b1.rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["event"], "user:online");
        assert_eq!(msg["payload"]["userId"], user.to_string());
        assert_eq!(msg["payload"]["isOnline"], true);
        assert!(b2.rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_presence_shared_rooms_only_reaches_shared() {
        let mut registry = ConnectionRegistry::new();
        let user = IdentityId::new_v4();
        let mut mine = member(&mut registry, user, Some("b1"));
        let mut peer = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let mut stranger =
            member(&mut registry, IdentityId::new_v4(), Some("b2"));

        let sent = Broadcaster::new(PresencePolicy::SharedRooms)
            .broadcast_presence(&registry, user, true, None)
            .unwrap();
        assert_eq!(sent, 2);
        assert!(mine.rx.try_recv().is_ok());
        assert!(peer.rx.try_recv().is_ok());
        assert!(stranger.rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_presence_shared_rooms_offline_uses_last_board() {
        let mut registry = ConnectionRegistry::new();
        let user = IdentityId::new_v4();
        let mut peer = member(&mut registry, IdentityId::new_v4(), Some("b1"));
        let mut stranger =
            member(&mut registry, IdentityId::new_v4(), Some("b2"));

        let sent = Broadcaster::new(PresencePolicy::SharedRooms)
            .broadcast_presence(&registry, user, false, Some(&BoardId::new("b1")))
            .unwrap();
        assert_eq!(sent, 1);
        let msg: serde_json::Value =
            serde_json::from_str(&peer.rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["payload"]["isOnline"], false);
        assert!(stranger.rx.try_recv().is_err());
    }
}
