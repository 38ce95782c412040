//! Connection sessions.
//!
//! A session owns one connection. Its lifecycle:
//!
//! ```text
//! Connecting ──establish──► Established ──start──► Reading ──► Closed
//!      │                                                        ▲
//!      └───────────────── handshake failed ─────────────────────┘
//! ```
//!
//! - [`PendingSession`] is the `Connecting` stage: an id and a peer label,
//!   no stream yet. It is consumed by [`PendingSession::establish`].
//! - [`Session::start`] joins the registry and spawns the read loop.
//! - The read loop dispatches every frame to the [`FrameHandler`] and
//!   awaits it before reading the next one, so frames from one connection
//!   are handled in arrival order.
//! - The loop ends on orderly disconnect, transport error, protocol
//!   violation, or [`Session::close`]. It then leaves the registry exactly
//!   once and moves to `Closed`.
//!
//! Writes go through the session's writer task ([`crate::writer`]). A failed
//! write is logged there and never tears the session down; teardown is
//! driven by the read loop alone. Teardown releases the session's writer
//! handle, so the writer flushes what is queued and shuts the connection
//! down even while other `Arc<Session>` clones are still alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{FramecastError, Result};
use crate::handler::{FrameContext, FrameHandler};
use crate::protocol::FramingConfig;
use crate::registry::Registry;
use crate::transport::{FrameReader, DEFAULT_READ_BUFFER_SIZE};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Session identifier, unique within a registry.
pub type SessionId = u64;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Accepted or dialing; handshake not finished.
    Connecting = 0,
    /// Stream ready, not reading yet.
    Established = 1,
    /// Read loop running.
    Reading = 2,
    /// Torn down.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Established,
            2 => SessionState::Reading,
            _ => SessionState::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Established => "established",
            SessionState::Reading => "reading",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Byte order and maximum frame size.
    pub framing: FramingConfig,
    /// Writer queue limits.
    pub writer: WriterConfig,
    /// Size of each socket read.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            framing: FramingConfig::default(),
            writer: WriterConfig::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// A connection that has been accepted but not yet established.
#[derive(Debug)]
pub struct PendingSession {
    id: SessionId,
    peer: String,
    registry: Arc<Registry>,
}

impl PendingSession {
    /// Allocate an id from `registry` for a new connection from `peer`.
    pub fn new(registry: Arc<Registry>, peer: impl Into<String>) -> Self {
        Self {
            id: registry.next_session_id(),
            peer: peer.into(),
            registry,
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer label.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Always `Connecting`.
    pub fn state(&self) -> SessionState {
        SessionState::Connecting
    }

    /// Split the stream, spawn the writer task, and return the established
    /// session together with the reader for [`Session::start`].
    pub fn establish<S>(
        self,
        stream: S,
        config: &SessionConfig,
    ) -> (Arc<Session>, FrameReader<ReadHalf<S>>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, _writer_task) =
            spawn_writer_task(write_half, config.writer.clone(), config.framing.byte_order);

        let reader =
            FrameReader::with_capacity(read_half, config.framing, config.read_buffer_size);

        let session = Arc::new(Session {
            id: self.id,
            peer: self.peer,
            state: AtomicU8::new(SessionState::Established as u8),
            close_requested: AtomicBool::new(false),
            close_signal: Notify::new(),
            writer: Mutex::new(Some(writer)),
            registry: self.registry,
        });

        tracing::debug!(session = session.id, peer = %session.peer, "session established");
        (session, reader)
    }
}

/// One live connection.
///
/// Shared as `Arc<Session>` between the registry, the read loop, and any
/// in-flight delivery. The writer task owns the write half; the session
/// holds its handle until teardown.
pub struct Session {
    id: SessionId,
    peer: String,
    state: AtomicU8,
    close_requested: AtomicBool,
    close_signal: Notify,
    writer: Mutex<Option<WriterHandle>>,
    registry: Arc<Registry>,
}

impl Session {
    /// Session id.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer label.
    #[inline]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Registry this session belongs to.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Frames queued on the writer but not yet written.
    pub fn pending_frames(&self) -> usize {
        self.writer()
            .as_ref()
            .map_or(0, WriterHandle::pending_count)
    }

    fn writer(&self) -> MutexGuard<'_, Option<WriterHandle>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the registry and spawn the read loop.
    ///
    /// Membership is visible as soon as this returns.
    pub fn start<R>(
        self: &Arc<Self>,
        reader: FrameReader<R>,
        handler: Arc<dyn FrameHandler>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.registry.join(self.clone());
        self.state
            .store(SessionState::Reading as u8, Ordering::Release);

        tokio::spawn(self.clone().read_loop(reader, handler))
    }

    async fn read_loop<R>(self: Arc<Self>, mut reader: FrameReader<R>, handler: Arc<dyn FrameHandler>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.close_signal.notified() => {
                    tracing::debug!(session = self.id, "close requested");
                    break;
                }
                next = reader.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => {
                    let ctx = FrameContext::new(self.clone());
                    if let Err(e) = handler.on_frame(ctx, frame.into_payload()).await {
                        tracing::warn!(session = self.id, error = %e, "frame handler failed");
                    }
                }
                Ok(None) => {
                    tracing::debug!(session = self.id, peer = %self.peer, "peer disconnected");
                    break;
                }
                Err(e) if e.is_protocol_violation() => {
                    tracing::warn!(session = self.id, peer = %self.peer, error = %e, "protocol violation");
                    break;
                }
                Err(e) => {
                    tracing::warn!(session = self.id, peer = %self.peer, error = %e, "transport error");
                    break;
                }
            }
        }

        self.teardown();
    }

    fn teardown(&self) {
        self.close_requested.store(true, Ordering::Release);
        let previous = self.state.swap(SessionState::Closed as u8, Ordering::AcqRel);
        if previous != SessionState::Closed as u8 {
            self.registry.leave(self.id);
        }
        // Last handle gone: the writer drains its queue and shuts down.
        drop(self.writer().take());
    }

    /// Queue a frame without waiting (fan-out path).
    ///
    /// Fails with `ConnectionClosed` once the session is closing or its
    /// writer has stopped, and with `BackpressureTimeout` if the queue is full.
    pub fn deliver(&self, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        match self.writer().as_ref() {
            Some(writer) if !writer.is_closed() => writer.try_send(payload),
            _ => Err(FramecastError::ConnectionClosed),
        }
    }

    /// Queue a frame, waiting up to the backpressure timeout for space.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        let writer = match self.writer().as_ref() {
            Some(writer) if !writer.is_closed() => writer.clone(),
            _ => return Err(FramecastError::ConnectionClosed),
        };
        writer.send(payload).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.close_requested.load(Ordering::Acquire) {
            return Err(FramecastError::ConnectionClosed);
        }
        Ok(())
    }

    /// Ask the read loop to stop. Teardown happens on the read loop.
    pub fn close(&self) {
        self.close_requested.store(true, Ordering::Release);
        self.close_signal.notify_one();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
