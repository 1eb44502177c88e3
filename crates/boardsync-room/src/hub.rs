//! The hub: one task that owns the [`ConnectionRegistry`].
//!
//! Connection tasks and mutation services never touch the registry
//! directly. They hold a [`HubHandle`] and send [`HubCommand`]s through a
//! bounded channel; the hub executes each command to completion before
//! looking at the next one, so a membership check and the broadcast or
//! mutation that depends on it can never interleave with another
//! connection's change.
//!
//! ```text
//! conn task ──┐
//! conn task ──┼── mpsc ──► Hub (owns ConnectionRegistry) ──► peer queues
//! service  ───┘
//! ```

use boardsync_protocol::{
    BoardAck, BoardEvent, BoardId, Event, Frame, IdentityId, ServerMessage,
};
use boardsync_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::{
    Broadcaster, ConnectionRegistry, HubConfig, PeerReceiver, PeerSender,
    RoomError,
};

pub(crate) enum HubCommand {
    /// Register a connection, optionally auto-joining a board, and record
    /// its presence.
    Connect {
        conn: ConnectionId,
        identity: IdentityId,
        sender: PeerSender,
        board: Option<BoardId>,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Join {
        conn: ConnectionId,
        board: BoardId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        conn: ConnectionId,
        reply: oneshot::Sender<Result<Option<BoardId>, RoomError>>,
    },
    /// Broadcast to whatever room the connection is in right now.
    BroadcastFrom {
        conn: ConnectionId,
        frame: Frame,
        reply: oneshot::Sender<Option<BoardId>>,
    },
    Broadcast {
        board: BoardId,
        frame: Frame,
        reply: oneshot::Sender<usize>,
    },
    Disconnect {
        conn: ConnectionId,
        reply: Option<oneshot::Sender<()>>,
    },
    RoomSize {
        board: BoardId,
        reply: oneshot::Sender<usize>,
    },
    IsOnline {
        identity: IdentityId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// A cloneable handle to the hub task.
///
/// Every method is a message to the hub. Methods that wait for a reply
/// fail with [`RoomError::Unavailable`] once the hub has stopped.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    broadcaster: Broadcaster,
    peer_queue_size: usize,
}

impl HubHandle {
    /// A fresh outbound queue for a connection, sized per
    /// [`HubConfig::peer_queue_size`].
    pub fn peer_queue(&self) -> (PeerSender, PeerReceiver) {
        mpsc::channel(self.peer_queue_size)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable)?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Registers a connection. With `board` set the connection joins that
    /// room and receives a `user:join` acknowledgement. If this is the
    /// identity's first live connection, `user:online` is announced.
    pub async fn connect(
        &self,
        conn: ConnectionId,
        identity: IdentityId,
        sender: PeerSender,
        board: Option<BoardId>,
    ) -> Result<(), RoomError> {
        self.request(|reply| HubCommand::Connect {
            conn,
            identity,
            sender,
            board,
            reply,
        })
        .await?
    }

    /// Moves the connection into `board`'s room and acknowledges with
    /// `user:join` on its own queue.
    pub async fn join(
        &self,
        conn: ConnectionId,
        board: BoardId,
    ) -> Result<(), RoomError> {
        self.request(|reply| HubCommand::Join { conn, board, reply })
            .await?
    }

    /// Leaves the current room, acknowledging with `user:left`. Returns
    /// the board left, or `None` if the connection was in no room.
    pub async fn leave(
        &self,
        conn: ConnectionId,
    ) -> Result<Option<BoardId>, RoomError> {
        self.request(|reply| HubCommand::Leave { conn, reply })
            .await?
    }

    /// Broadcasts `msg` to the room `conn` is currently in (including
    /// `conn` itself). Returns that board, or `None` if it is in no room.
    pub async fn broadcast_from(
        &self,
        conn: ConnectionId,
        msg: &ServerMessage,
    ) -> Result<Option<BoardId>, RoomError> {
        let frame = self.broadcaster.frame(msg)?;
        self.request(|reply| HubCommand::BroadcastFrom { conn, frame, reply })
            .await
    }

    /// Broadcasts an event to everyone viewing `board`. Returns how many
    /// connections it was queued to.
    pub async fn broadcast_to_board<T: serde::Serialize>(
        &self,
        board: BoardId,
        event: Event,
        payload: &T,
    ) -> Result<usize, RoomError> {
        let msg = ServerMessage::new(event, payload)?;
        let frame = self.broadcaster.frame(&msg)?;
        self.request(|reply| HubCommand::Broadcast {
            board,
            frame,
            reply,
        })
        .await
    }

    /// Announces a committed change to the affected board.
    pub async fn publish(&self, event: BoardEvent) -> Result<usize, RoomError> {
        let board = event.board_id().clone();
        let frame = self.broadcaster.frame(&event.into_message())?;
        self.request(|reply| HubCommand::Broadcast {
            board,
            frame,
            reply,
        })
        .await
    }

    /// Removes a connection from its room and its identity's presence,
    /// announcing `user:online` (offline) when that was the last one.
    /// Waits until the hub has processed it.
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| HubCommand::Disconnect {
            conn,
            reply: Some(reply),
        })
        .await
    }

    /// Like [`disconnect`](Self::disconnect) but without waiting and
    /// without blocking: usable from `Drop`. Falls back to a spawned send
    /// when the command channel is full.
    pub fn disconnect_detached(&self, conn: ConnectionId) {
        let cmd = HubCommand::Disconnect { conn, reply: None };
        if let Err(mpsc::error::TrySendError::Full(cmd)) =
            self.sender.try_send(cmd)
        {
            let sender = self.sender.clone();
            tokio::spawn(async move {
                let _ = sender.send(cmd).await;
            });
        }
    }

    /// Number of connections viewing `board`.
    pub async fn room_size(&self, board: BoardId) -> Result<usize, RoomError> {
        self.request(|reply| HubCommand::RoomSize { board, reply })
            .await
    }

    /// Whether `identity` has at least one live connection.
    pub async fn is_online(
        &self,
        identity: IdentityId,
    ) -> Result<bool, RoomError> {
        self.request(|reply| HubCommand::IsOnline { identity, reply })
            .await
    }

    /// Stops the hub. Pending commands behind this one are dropped.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(HubCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable)
    }
}

struct Hub {
    registry: ConnectionRegistry,
    broadcaster: Broadcaster,
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    async fn run(mut self) {
        tracing::info!(policy = ?self.broadcaster.policy(), "hub started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                HubCommand::Connect {
                    conn,
                    identity,
                    sender,
                    board,
                    reply,
                } => {
                    let result = self.handle_connect(conn, identity, sender, board);
                    let _ = reply.send(result);
                }
                HubCommand::Join { conn, board, reply } => {
                    let _ = reply.send(self.handle_join(conn, board));
                }
                HubCommand::Leave { conn, reply } => {
                    let _ = reply.send(self.handle_leave(conn));
                }
                HubCommand::BroadcastFrom { conn, frame, reply } => {
                    let board = self.registry.board_of(conn).cloned();
                    if let Some(board) = &board {
                        self.broadcaster
                            .broadcast_to_room(&self.registry, board, &frame);
                    }
                    let _ = reply.send(board);
                }
                HubCommand::Broadcast {
                    board,
                    frame,
                    reply,
                } => {
                    let sent = self.broadcaster.broadcast_to_room(
                        &self.registry,
                        &board,
                        &frame,
                    );
                    let _ = reply.send(sent);
                }
                HubCommand::Disconnect { conn, reply } => {
                    self.handle_disconnect(conn);
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                }
                HubCommand::RoomSize { board, reply } => {
                    let size = self.registry.room(&board).map_or(0, |m| m.len());
                    let _ = reply.send(size);
                }
                HubCommand::IsOnline { identity, reply } => {
                    let _ = reply.send(self.registry.presence(identity).is_some());
                }
                HubCommand::Shutdown => {
                    tracing::info!("hub shutting down");
                    break;
                }
            }
        }

        tracing::info!(
            connections = self.registry.connection_count(),
            "hub stopped"
        );
    }

    fn handle_connect(
        &mut self,
        conn: ConnectionId,
        identity: IdentityId,
        sender: PeerSender,
        board: Option<BoardId>,
    ) -> Result<(), RoomError> {
        self.registry.attach(conn, identity, sender);
        if let Some(board) = board {
            self.handle_join(conn, board)?;
        }
        if self.registry.add_presence(identity, conn) {
            self.announce_presence(identity, true, None);
        }
        Ok(())
    }

    fn handle_join(
        &mut self,
        conn: ConnectionId,
        board: BoardId,
    ) -> Result<(), RoomError> {
        self.registry.join_room(conn, board.clone())?;
        tracing::debug!(%conn, %board, "joined board");
        self.send_ack(conn, Event::UserJoin, board)
    }

    fn handle_leave(
        &mut self,
        conn: ConnectionId,
    ) -> Result<Option<BoardId>, RoomError> {
        if self.registry.identity_of(conn).is_none() {
            return Err(RoomError::UnknownConnection(conn));
        }
        let Some(board) = self.registry.leave_room(conn) else {
            return Ok(None);
        };
        tracing::debug!(%conn, %board, "left board");
        self.send_ack(conn, Event::UserLeft, board.clone())?;
        Ok(Some(board))
    }

    fn handle_disconnect(&mut self, conn: ConnectionId) {
        let Some(detached) = self.registry.detach(conn) else {
            return;
        };
        if self.registry.remove_presence(detached.identity, conn) {
            self.announce_presence(
                detached.identity,
                false,
                detached.board.as_ref(),
            );
        }
        tracing::debug!(
            %conn,
            identity = %detached.identity,
            board = ?detached.board,
            "connection deregistered"
        );
    }

    fn announce_presence(
        &self,
        identity: IdentityId,
        is_online: bool,
        last_board: Option<&BoardId>,
    ) {
        if let Err(e) = self.broadcaster.broadcast_presence(
            &self.registry,
            identity,
            is_online,
            last_board,
        ) {
            tracing::warn!(%identity, error = %e, "presence broadcast failed");
        }
    }

    /// Queues a `{boardId}` acknowledgement to the connection itself.
    fn send_ack(
        &self,
        conn: ConnectionId,
        event: Event,
        board_id: BoardId,
    ) -> Result<(), RoomError> {
        let msg = ServerMessage::new(event, &BoardAck { board_id })?;
        let frame = self.broadcaster.frame(&msg)?;
        if let Some(sender) = self.registry.sender(conn) {
            if sender.try_send(frame).is_err() {
                tracing::warn!(%conn, ?event, "failed to queue acknowledgement");
            }
        }
        Ok(())
    }
}

/// Spawns the hub task and returns a handle to it.
///
/// The registry lives exactly as long as this task; each call creates an
/// independent hub.
pub fn spawn_hub(config: HubConfig) -> HubHandle {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let broadcaster = Broadcaster::new(config.presence_policy);

    let hub = Hub {
        registry: ConnectionRegistry::new(),
        broadcaster: broadcaster.clone(),
        receiver: rx,
    };
    tokio::spawn(hub.run());

    HubHandle {
        sender: tx,
        broadcaster,
        peer_queue_size: config.peer_queue_size.max(1),
    }
}
