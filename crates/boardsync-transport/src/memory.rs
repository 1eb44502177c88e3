//! In-process connection pair backed by tokio channels.
//!
//! [`pair`] returns the server side (a [`Connection`]) and the client side
//! (a [`MemoryPeer`]). Connection handlers can be exercised end-to-end
//! without binding a socket.

use tokio::sync::{Mutex, mpsc};

use crate::{
    CloseReason, Connection, ConnectionId, Handshake, Inbound, TransportError,
};

/// A frame the server side wrote, as observed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Text(String),
    Ping,
    Close(Option<CloseReason>),
}

/// Server side of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    handshake: Handshake,
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::UnboundedSender<PeerFrame>,
}

/// Client side of an in-process connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<PeerFrame>,
}

/// Creates a connected pair carrying the given handshake.
pub fn pair(handshake: Handshake) -> (MemoryConnection, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let conn = MemoryConnection {
        id: ConnectionId::next(),
        handshake,
        inbound: Mutex::new(in_rx),
        outbound: out_tx,
    };
    let peer = MemoryPeer {
        inbound: Some(in_tx),
        outbound: out_rx,
    };
    (conn, peer)
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, text: &str) -> Result<(), Self::Error> {
        self.outbound
            .send(PeerFrame::Text(text.to_owned()))
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.outbound
            .send(PeerFrame::Ping)
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn close(
        &self,
        reason: Option<CloseReason>,
    ) -> Result<(), Self::Error> {
        // A peer that already went away has nothing left to tell.
        let _ = self.outbound.send(PeerFrame::Close(reason));
        self.inbound.lock().await.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn handshake(&self) -> &Handshake {
        &self.handshake
    }
}

impl MemoryPeer {
    /// Sends a text message to the server side. Returns `false` once the
    /// server side has closed.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Inbound::Message(text.as_bytes().to_vec()))
    }

    /// Answers a ping (or volunteers a heartbeat).
    pub fn send_heartbeat(&self) -> bool {
        self.send(Inbound::Heartbeat)
    }

    fn send(&self, frame: Inbound) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Closes the client side; the server sees a clean close.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Waits for the next frame written by the server side.
    pub async fn recv(&mut self) -> Option<PeerFrame> {
        self.outbound.recv().await
    }

    /// Waits for the next text frame, skipping pings. Returns `None` on
    /// close.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.outbound.recv().await? {
                PeerFrame::Text(text) => return Some(text),
                PeerFrame::Ping => continue,
                PeerFrame::Close(_) => return None,
            }
        }
    }

    /// Returns a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<PeerFrame> {
        self.outbound.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_carries_text_both_ways() {
        let (conn, mut peer) = pair(Handshake::default());

        conn.send("hello").await.unwrap();
        assert_eq!(peer.recv_text().await.as_deref(), Some("hello"));

        assert!(peer.send_text("hi"));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Inbound::Message(b"hi".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_hang_up_reads_as_clean_close() {
        let (conn, mut peer) = pair(Handshake::default());
        peer.hang_up();
        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!peer.send_text("late"));
    }

    #[tokio::test]
    async fn test_close_delivers_reason_to_peer() {
        let (conn, mut peer) = pair(Handshake::default());
        conn.close(Some(CloseReason::policy("bye"))).await.unwrap();
        assert_eq!(
            peer.recv().await,
            Some(PeerFrame::Close(Some(CloseReason::policy("bye"))))
        );
    }

    #[tokio::test]
    async fn test_send_fails_after_peer_dropped() {
        let (conn, peer) = pair(Handshake::default());
        drop(peer);
        assert!(conn.send("x").await.is_err());
    }
}
