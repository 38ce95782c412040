//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] provides a fluent API for configuring framing,
//! write queues, the handshake, and the frame handler. The [`Server`] then
//! runs the accept loop:
//! 1. Accept a connection (`Connecting`)
//! 2. Run the handshake, bounded by `handshake_timeout`
//! 3. Establish the session and join the registry
//! 4. Read frames and dispatch them to the handler until the peer leaves
//!
//! # Example
//!
//! ```no_run
//! use framecast::{Server, handler::Broadcast};
//!
//! #[tokio::main]
//! async fn main() -> framecast::error::Result<()> {
//!     let server = Server::builder()
//!         .max_frame_size(1024 * 1024)
//!         .handler(Broadcast::default())
//!         .bind(&"127.0.0.1:7000".parse()?)
//!         .await?;
//!
//!     server.run_until_ctrl_c().await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::{FramecastError, Result};
use crate::handler::{Broadcast, FrameHandler};
use crate::protocol::ByteOrder;
use crate::registry::Registry;
use crate::session::{PendingSession, SessionConfig};
use crate::transport::{Endpoint, Handshake, Listener, Plain, Stream};

/// Default time allowed for the handshake of one connection.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring and creating a server.
pub struct ServerBuilder<H = Plain> {
    config: SessionConfig,
    handshake_timeout: Duration,
    handler: Arc<dyn FrameHandler>,
    handshake: H,
}

impl ServerBuilder<Plain> {
    /// Create a builder with default settings: big-endian 16 MiB frames,
    /// no handshake, broadcast to every session.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handler: Arc::new(Broadcast::default()),
            handshake: Plain,
        }
    }
}

impl Default for ServerBuilder<Plain> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handshake> ServerBuilder<H> {
    /// Largest payload accepted from a peer.
    ///
    /// Default: 16 MiB
    pub fn max_frame_size(mut self, max: u32) -> Self {
        self.config.framing.max_frame_size = max;
        self
    }

    /// Byte order of the length prefix, both directions.
    ///
    /// Default: big endian
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.config.framing.byte_order = order;
        self
    }

    /// Frames queued per session before fan-out to it starts failing.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// Writer channel capacity per session.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// How long a direct reply waits for queue space.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Size of each socket read.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Time allowed for a connection's handshake.
    ///
    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Replace the whole per-session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler called for every received frame.
    pub fn handler<F: FrameHandler>(mut self, handler: F) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Handshake run on every accepted connection before it joins.
    pub fn handshake<H2: Handshake>(self, handshake: H2) -> ServerBuilder<H2> {
        ServerBuilder {
            config: self.config,
            handshake_timeout: self.handshake_timeout,
            handler: self.handler,
            handshake,
        }
    }

    /// Bind a listener and build the server.
    pub async fn bind(self, endpoint: &Endpoint) -> Result<Server<H>> {
        let listener = Listener::bind(endpoint).await?;
        Ok(self.serve(listener))
    }

    /// Build the server on an already bound listener.
    pub fn serve(self, listener: Listener) -> Server<H> {
        Server {
            listener,
            shared: Arc::new(Shared {
                registry: Arc::new(Registry::new()),
                config: self.config,
                handshake_timeout: self.handshake_timeout,
                handler: self.handler,
                handshake: self.handshake,
            }),
        }
    }
}

/// State every connection task needs.
struct Shared<H> {
    registry: Arc<Registry>,
    config: SessionConfig,
    handshake_timeout: Duration,
    handler: Arc<dyn FrameHandler>,
    handshake: H,
}

/// A bound server, ready to accept.
pub struct Server<H = Plain> {
    listener: Listener,
    shared: Arc<Shared<H>>,
}

impl Server<Plain> {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder<Plain> {
        ServerBuilder::new()
    }
}

impl<H: Handshake> Server<H> {
    /// The endpoint actually bound.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        self.listener.local_endpoint()
    }

    /// The registry of live sessions.
    pub fn registry(&self) -> Arc<Registry> {
        self.shared.registry.clone()
    }

    /// Per-session configuration in use.
    pub fn session_config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Accept connections until `shutdown` resolves, then close every session.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, shared } = self;
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = shared.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer.clone(), shared).await {
                                tracing::warn!(peer = %peer, error = %e, "connection failed");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(members = shared.registry.len(), "server shutting down");
        shared.registry.close_all();
        connections.abort_all();
        while connections.join_next().await.is_some() {}
        // Sessions that finished their handshake during the first pass.
        shared.registry.close_all();

        Ok(())
    }

    /// Accept connections until Ctrl-C.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_connection<H: Handshake>(
    stream: Stream,
    peer: String,
    shared: Arc<Shared<H>>,
) -> Result<()> {
    let pending = PendingSession::new(shared.registry.clone(), peer);
    tracing::debug!(session = pending.id(), peer = %pending.peer(), "connection accepted");

    let stream = tokio::time::timeout(
        shared.handshake_timeout,
        shared.handshake.handshake(stream),
    )
    .await
    .map_err(|_| FramecastError::Handshake("timed out".into()))??;

    let (session, reader) = pending.establish(stream, &shared.config);
    let read_loop = session.start(reader, shared.handler.clone());

    if let Err(e) = read_loop.await {
        tracing::error!(session = session.id(), error = %e, "read loop panicked");
    }
    Ok(())
}
