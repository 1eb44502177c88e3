//! `BoardsyncServer` builder and server loop.
//!
//! This is the entry point for running a boardsync server. It ties
//! together all the layers: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use boardsync_protocol::JsonCodec;
use boardsync_room::{HubConfig, HubHandle, spawn_hub};
use boardsync_session::{
    Accounts, IdentityProvider, MemoryIdentities, MemoryStore, Passwords,
    SessionResolver, SessionStore, TokenAuthority, TokenConfig,
};
use boardsync_transport::{
    PendingUpgrade, Transport, TransportError, WebSocketTransport,
};

use crate::handler::handle_connection;
use crate::{
    BoardDirectory, BoardsyncError, ConfigError, MemoryBoards, ServerConfig,
    StickerPositions,
};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<S, P, B> {
    pub(crate) resolver: Arc<SessionResolver<S, P>>,
    pub(crate) hub: HubHandle,
    pub(crate) boards: Arc<B>,
    pub(crate) codec: JsonCodec,
    pub(crate) heartbeat: Option<Duration>,
}

impl<S, P, B> ServerState<S, P, B>
where
    S: SessionStore,
    P: IdentityProvider,
{
    pub(crate) fn new(
        config: &ServerConfig,
        passwords: Passwords,
        store: S,
        identities: P,
        boards: B,
    ) -> Self {
        let authority = Arc::new(TokenAuthority::new(
            store,
            config.tokens.clone(),
            passwords,
        ));
        Self {
            resolver: Arc::new(SessionResolver::new(authority, identities)),
            hub: spawn_hub(config.hub.clone()),
            boards: Arc::new(boards),
            codec: JsonCodec,
            heartbeat: config.heartbeat_interval(),
        }
    }
}

/// Builder for configuring and starting a boardsync server.
///
/// # Example
///
/// ```rust,no_run
/// use boardsync::prelude::*;
///
/// # async fn start() -> Result<(), BoardsyncError> {
/// let server = BoardsyncServer::builder()
///     .bind("0.0.0.0:8080")
///     .tokens(TokenConfig {
///         secret: "change-me".into(),
///         ..TokenConfig::default()
///     })
///     .build(MemoryStore::new(), MemoryIdentities::new(), MemoryBoards::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct BoardsyncServerBuilder {
    config: ServerConfig,
    passwords: Passwords,
}

impl BoardsyncServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            passwords: Passwords::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn tokens(mut self, tokens: TokenConfig) -> Self {
        self.config.tokens = tokens;
        self
    }

    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.config.hub = hub;
        self
    }

    /// Sets the ping period. `Duration::ZERO` disables the heartbeat.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_secs = interval.as_secs();
        self
    }

    /// Sets the password hashing cost.
    pub fn passwords(mut self, passwords: Passwords) -> Self {
        self.passwords = passwords;
        self
    }

    /// Binds the transport and starts the hub.
    ///
    /// # Errors
    /// Fails with [`ConfigError::MissingSecret`] when no token secret is
    /// configured, or with a transport error when binding fails.
    pub async fn build<S, P, B>(
        self,
        store: S,
        identities: P,
        boards: B,
    ) -> Result<BoardsyncServer<S, P, B>, BoardsyncError>
    where
        S: SessionStore,
        P: IdentityProvider,
        B: StickerPositions + BoardDirectory,
    {
        if self.config.tokens.secret.is_empty() {
            return Err(ConfigError::MissingSecret.into());
        }
        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_handshake_timeout(self.config.handshake_timeout());
        let state = Arc::new(ServerState::new(
            &self.config,
            self.passwords,
            store,
            identities,
            boards,
        ));
        Ok(BoardsyncServer { transport, state })
    }
}

impl Default for BoardsyncServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound boardsync server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BoardsyncServer<
    S = MemoryStore,
    P = MemoryIdentities,
    B = MemoryBoards,
> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, P, B>>,
}

impl BoardsyncServer {
    /// Creates a new builder.
    pub fn builder() -> BoardsyncServerBuilder {
        BoardsyncServerBuilder::new()
    }
}

impl<S, P, B> BoardsyncServer<S, P, B>
where
    S: SessionStore,
    P: IdentityProvider,
    B: StickerPositions + BoardDirectory,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Handle for mutation services to announce committed board changes.
    pub fn hub(&self) -> HubHandle {
        self.state.hub.clone()
    }

    /// Signup, login, refresh, signout and logout-all, sharing this
    /// server's token authority.
    pub fn accounts(&self) -> Accounts<S, P> {
        Accounts::new(Arc::clone(&self.state.resolver))
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), BoardsyncError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then stops the hub.
    ///
    /// Stopping the hub ends every connection task: each closes its socket
    /// with "going away".
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), BoardsyncError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("boardsync server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept_tcp() => self.spawn_handler(accepted),
            }
        }

        tracing::info!("boardsync server shutting down");
        self.transport.shutdown().await?;
        self.state.hub.shutdown().await?;
        Ok(())
    }

    /// Upgrades and serves one connection on its own task, so a slow
    /// handshake never holds up the accept loop.
    fn spawn_handler(&self, accepted: Result<PendingUpgrade, TransportError>) {
        match accepted {
            Ok(pending) => {
                let state = Arc::clone(&self.state);
                tokio::spawn(async move {
                    let addr = pending.peer_addr();
                    let conn = match pending.upgrade().await {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::debug!(%addr, error = %e, "upgrade failed");
                            return;
                        }
                    };
                    if let Err(e) = handle_connection(conn, state).await {
                        tracing::debug!(
                            error = %e,
                            "connection ended with error"
                        );
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}
