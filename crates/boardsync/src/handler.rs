//! Per-connection handler: session resolution, registration, and the
//! message loop.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Resolve the session from the handshake cookies (or close 1008)
//!   2. Deliver newly issued credentials as `session:issued`
//!   3. Register with the hub, auto-joining the `boardId` query board
//!   4. Loop: inbound frames → dispatcher, hub frames → socket, pings
//!
//! Deregistration happens in a drop guard, so it runs however the loop
//! ends.

use std::sync::Arc;

use boardsync_protocol::{BoardId, Codec, Event, ServerMessage};
use boardsync_room::HubHandle;
use boardsync_session::{IdentityProvider, SessionCredentials, SessionStore};
use boardsync_transport::{
    CloseReason, Connection, ConnectionId, Inbound, TransportError,
};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::dispatch::MessageDispatcher;
use crate::server::ServerState;
use crate::{BoardDirectory, BoardsyncError, StickerPositions};

/// Close reason sent when no identity could be resolved.
pub const UNAUTHORIZED_REASON: &str = "Unauthorized: Authentication error";
const SHUTDOWN_REASON: &str = "Server shutting down";
const IDLE_REASON: &str = "Connection idle";

/// Where a connection is in its life.
///
/// `Connecting → Authenticated → (Joined ⇄ Authenticated) → Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, session not resolved yet.
    Connecting,
    /// Registered with the hub, in no room.
    Authenticated,
    /// Registered and viewing a board.
    Joined(BoardId),
    Closed,
}

/// Deregisters the connection from the hub when the handler exits.
///
/// `Drop` is synchronous, so the disconnect is queued without waiting.
struct ConnectionGuard {
    conn_id: ConnectionId,
    hub: HubHandle,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.disconnect_detached(self.conn_id);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, S, P, B>(
    conn: C,
    state: Arc<ServerState<S, P, B>>,
) -> Result<(), BoardsyncError>
where
    C: Connection<Error = TransportError>,
    S: SessionStore,
    P: IdentityProvider,
    B: StickerPositions + BoardDirectory,
{
    let conn_id = conn.id();
    let mut lifecycle = ConnectionState::Connecting;
    tracing::debug!(%conn_id, state = ?lifecycle, "handling new connection");

    // --- Step 1: resolve the session ---
    let credentials =
        SessionCredentials::from_cookies(|name| conn.handshake().cookie(name));
    let resolved = match state.resolver.resolve(credentials.as_ref()).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(%conn_id, error = %e, "websocket authentication error");
            conn.close(Some(CloseReason::policy(UNAUTHORIZED_REASON)))
                .await?;
            return Err(e.into());
        }
    };
    let identity = resolved.identity.id;

    // --- Step 2: hand out new credentials first ---
    if let Some(issued) = &resolved.issued {
        let msg = ServerMessage::new(Event::SessionIssued, issued)?;
        conn.send(&state.codec.encode_frame(&msg)?).await?;
    }

    // --- Step 3: register ---
    let board = conn.handshake().query("boardId").map(BoardId::new);
    if let Some(board) = &board {
        match state.boards.board_exists(board).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%conn_id, %board, "board not found, joining anyway");
            }
            Err(e) => {
                tracing::warn!(%conn_id, %board, error = %e, "board lookup failed");
            }
        }
    }

    let (sender, mut outbound) = state.hub.peer_queue();
    state
        .hub
        .connect(conn_id, identity, sender, board.clone())
        .await?;
    let _guard = ConnectionGuard {
        conn_id,
        hub: state.hub.clone(),
    };
    lifecycle = match board {
        Some(board) => ConnectionState::Joined(board),
        None => ConnectionState::Authenticated,
    };
    tracing::info!(%conn_id, %identity, state = ?lifecycle, "connection authenticated");

    // --- Step 4: message loop ---
    let dispatcher = MessageDispatcher::new(&state, conn_id, identity);
    let mut heartbeat = state.heartbeat.map(|period| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut alive = true;

    let close = loop {
        tokio::select! {
            frame = outbound.recv() => {
                // The hub dropped our queue: it has shut down.
                let Some(frame) = frame else {
                    break Some(CloseReason::going_away(SHUTDOWN_REASON));
                };
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(%conn_id, error = %e, "send failed");
                    break None;
                }
            }
            inbound = conn.recv() => match inbound {
                Ok(Some(Inbound::Message(data))) => {
                    alive = true;
                    if let Err(e) = dispatcher.dispatch(&data, &mut lifecycle).await {
                        e.log(conn_id, identity);
                        let reply = ServerMessage::error(e.to_string());
                        conn.send(&state.codec.encode_frame(&reply)?).await?;
                    }
                }
                Ok(Some(Inbound::Heartbeat)) => alive = true,
                Ok(None) => {
                    tracing::info!(%conn_id, %identity, "connection closed cleanly");
                    break None;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    break None;
                }
            },
            () = tick(&mut heartbeat) => {
                if !alive {
                    tracing::info!(%conn_id, %identity, "connection idle, closing");
                    break Some(CloseReason::going_away(IDLE_REASON));
                }
                alive = false;
                if let Err(e) = conn.ping().await {
                    tracing::debug!(%conn_id, error = %e, "ping failed");
                    break None;
                }
            }
        }
    };

    if let Some(reason) = close {
        if let Err(e) = conn.close(Some(reason)).await {
            tracing::debug!(%conn_id, error = %e, "close failed");
        }
    }
    lifecycle = ConnectionState::Closed;
    tracing::debug!(%conn_id, %identity, state = ?lifecycle, "connection finished");

    // _guard drops here → hub disconnect fires.
    Ok(())
}

/// Next heartbeat tick; never resolves when the heartbeat is disabled.
async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
