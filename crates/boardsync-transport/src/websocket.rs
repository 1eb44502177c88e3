//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{
    CloseReason, Connection, ConnectionId, Handshake, Inbound, Transport,
    TransportError,
};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// How long a freshly accepted TCP peer gets to complete the upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets how long a peer may take to send its upgrade request.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts the next TCP connection without upgrading it.
    ///
    /// Servers with many clients call this in their accept loop and run
    /// [`PendingUpgrade::upgrade`] in the per-connection task, so a peer
    /// that never finishes its handshake holds up nobody else.
    pub async fn accept_tcp(&self) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        Ok(PendingUpgrade {
            stream,
            addr,
            timeout: self.handshake_timeout,
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.accept_tcp().await?.upgrade().await
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// An accepted TCP stream whose WebSocket upgrade has not run yet.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
    timeout: Duration,
}

impl PendingUpgrade {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the upgrade handshake, giving up after the transport's
    /// handshake timeout.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let Self {
            stream,
            addr,
            timeout,
        } = self;

        // The upgrade callback is synchronous; it only copies what we need
        // out of the request.
        let mut handshake = Handshake::default();
        let upgrade = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let cookies = req
                    .headers()
                    .get_all(COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok());
                handshake = Handshake::from_parts(cookies, req.uri().query());
                Ok(resp)
            },
        );
        let ws = tokio::time::timeout(timeout, upgrade)
            .await
            .map_err(|_| TransportError::HandshakeTimeout(addr))??;

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (writer, reader) = ws.split();
        Ok(WebSocketConnection {
            id,
            handshake: handshake.with_peer_addr(addr),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

/// A single WebSocket connection with independently locked halves.
pub struct WebSocketConnection {
    id: ConnectionId,
    handshake: Handshake,
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, text: &str) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .send(Message::text(text.to_owned()))
            .await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        loop {
            let msg = self.reader.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Inbound::Message(
                        text.as_str().as_bytes().to_vec(),
                    )));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Inbound::Message(data.to_vec())));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    return Ok(Some(Inbound::Heartbeat));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .send(Message::Ping(Default::default()))
            .await?;
        Ok(())
    }

    async fn close(
        &self,
        reason: Option<CloseReason>,
    ) -> Result<(), Self::Error> {
        let frame = reason.map(|r| CloseFrame {
            code: CloseCode::from(r.code),
            reason: r.reason.into(),
        });
        let mut writer = self.writer.lock().await;
        writer.send(Message::Close(frame)).await?;
        // The peer may already be gone; the close frame is what matters.
        let _ = writer.close().await;
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn handshake(&self) -> &Handshake {
        &self.handshake
    }
}
