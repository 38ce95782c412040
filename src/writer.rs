//! Dedicated writer task, one per session.
//!
//! Every write to a connection goes through an mpsc channel to a single task
//! that owns the write half. Frames from different producers (the session's
//! own handler, fan-out from other sessions) therefore never interleave on
//! the wire, and nobody holds a lock across a socket write.
//!
//! ```text
//! reply      ─┐
//! broadcast  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► write half
//! broadcast  ─┘
//! ```
//!
//! Ready frames are batched into a single `write_vectored` call. The task
//! owns its queued payloads, so a write that is already queued completes (or
//! fails) against a live stream even if the session itself has been dropped
//! from the registry.

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backpressure::{BackpressureController, BackpressureGuard};
use crate::error::{FramecastError, Result};
use crate::protocol::{ByteOrder, LengthPrefix, LENGTH_PREFIX_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = crate::backpressure::DEFAULT_MAX_PENDING;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = crate::backpressure::DEFAULT_TIMEOUT;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded length prefix.
    pub prefix: [u8; LENGTH_PREFIX_SIZE],
    /// Payload bytes (may be empty).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create an outbound frame, encoding its length prefix.
    ///
    /// Fails if the payload does not fit the 32-bit length field.
    pub fn new(payload: Bytes, order: ByteOrder) -> Result<Self> {
        let prefix = LengthPrefix::for_payload(payload.len())?;
        Ok(Self {
            prefix: prefix.encode(order),
            payload,
        })
    }

}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// How long `WriterHandle::send` waits for a free slot.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for queueing frames on a writer task.
///
/// Cheap to clone. The task exits once every handle is dropped and the queue
/// is drained.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    backpressure: BackpressureController,
    byte_order: ByteOrder,
}

impl WriterHandle {
    /// Queue a payload, waiting for space up to the backpressure timeout.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        let frame = OutboundFrame::new(payload, self.byte_order)?;
        self.send_frame(frame).await
    }

    async fn send_frame(&self, frame: OutboundFrame) -> Result<()> {
        if self.tx.is_closed() {
            return Err(FramecastError::ConnectionClosed);
        }

        self.backpressure.reserve().await?;
        let guard = BackpressureGuard::new(self.backpressure.clone());

        self.tx
            .send(frame)
            .await
            .map_err(|_| FramecastError::ConnectionClosed)?;
        guard.disarm();
        Ok(())
    }

    /// Queue a payload without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if the queue is full.
    pub fn try_send(&self, payload: Bytes) -> Result<()> {
        let frame = OutboundFrame::new(payload, self.byte_order)?;
        self.try_send_frame(frame)
    }

    fn try_send_frame(&self, frame: OutboundFrame) -> Result<()> {
        if self.tx.is_closed() {
            return Err(FramecastError::ConnectionClosed);
        }

        self.backpressure.try_reserve()?;
        let guard = BackpressureGuard::new(self.backpressure.clone());

        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FramecastError::BackpressureTimeout,
            mpsc::error::TrySendError::Closed(_) => FramecastError::ConnectionClosed,
        })?;
        guard.disarm();
        Ok(())
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.is_active()
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.backpressure.pending_count()
    }

    /// Whether the writer task has stopped accepting frames.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The `JoinHandle` resolves when every handle is dropped (`Ok`) or at the
/// first write failure (`Err`).
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    byte_order: ByteOrder,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let backpressure =
        BackpressureController::with_timeout(config.max_pending_frames, config.backpressure_timeout);

    let handle = WriterHandle {
        tx,
        backpressure: backpressure.clone(),
        byte_order,
    };

    let task = tokio::spawn(writer_loop(rx, writer, backpressure));

    (handle, task)
}

/// Spawn the writer task with default configuration and big-endian prefixes.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default(), ByteOrder::default())
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    backpressure: BackpressureController,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        let Some(first) = rx.recv().await else {
            // Every handle dropped: send FIN and stop.
            let _ = writer.shutdown().await;
            return Ok(());
        };

        batch.clear();
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let result = write_batch(&mut writer, &batch).await;
        backpressure.release_many(batch.len());

        if let Err(e) = result {
            tracing::warn!(error = %e, frames = batch.len(), "write failed, stopping writer");

            rx.close();
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            backpressure.release_many(dropped);

            return Err(e);
        }
    }
}

/// Write a batch of frames with scatter/gather I/O, then flush.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.prefix.len() + f.payload.len()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(FramecastError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip_bytes` of the batch.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.prefix[..], &frame.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuffer, FramingConfig};
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(payload: &'static [u8]) -> OutboundFrame {
        OutboundFrame::new(Bytes::from_static(payload), ByteOrder::Big).unwrap()
    }

    /// Accepts at most `limit` bytes per write call.
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Fails every write.
    struct Broken;

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_outbound_frame_prefix() {
        let f = frame(b"hello");
        assert_eq!(f.prefix, [0, 0, 0, 5]);

        let le = OutboundFrame::new(Bytes::from_static(b"hello"), ByteOrder::Little).unwrap();
        assert_eq!(le.prefix, [5, 0, 0, 0]);
    }

    #[test]
    fn test_outbound_frame_empty() {
        let f = frame(b"");
        assert!(f.payload.is_empty());
        assert_eq!(f.prefix, [0; LENGTH_PREFIX_SIZE]);
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        handle.send(Bytes::from_static(b"hello")).await.unwrap();

        let mut buf = [0u8; LENGTH_PREFIX_SIZE + 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x00\x00\x00\x05hello");
    }

    #[tokio::test]
    async fn test_frames_arrive_in_queue_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, task) = spawn_writer_task_default(client);

        for i in 0..100u32 {
            handle
                .send(Bytes::copy_from_slice(&i.to_be_bytes()))
                .await
                .unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();

        let frames = FrameBuffer::new(FramingConfig::default()).push(&wire).unwrap();
        let values: Vec<u32> = frames
            .iter()
            .map(|f| u32::from_be_bytes(f.payload().try_into().unwrap()))
            .collect();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_try_send_full_queue() {
        // Nobody reads the peer, so the first frame never finishes writing.
        let (client, _server) = duplex(8);
        let config = WriterConfig {
            max_pending_frames: 2,
            channel_capacity: 16,
            backpressure_timeout: Duration::from_millis(20),
        };
        let (handle, _task) = spawn_writer_task(client, config, ByteOrder::Big);

        handle.try_send(Bytes::from_static(b"0123456789")).unwrap();
        handle.try_send(Bytes::from_static(b"0123456789")).unwrap();

        assert!(handle.is_backpressure_active());
        assert!(matches!(
            handle.try_send(Bytes::from_static(b"x")),
            Err(FramecastError::BackpressureTimeout)
        ));
        assert!(matches!(
            handle.send(Bytes::from_static(b"x")).await,
            Err(FramecastError::BackpressureTimeout)
        ));
    }

    #[tokio::test]
    async fn test_write_failure_closes_handle() {
        let (handle, task) = spawn_writer_task_default(Broken);

        handle.send(Bytes::from_static(b"doomed")).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(FramecastError::Io(_))));
        assert!(handle.is_closed());
        assert_eq!(handle.pending_count(), 0);
        assert!(matches!(
            handle.try_send(Bytes::from_static(b"late")),
            Err(FramecastError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_handle_drop() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        drop(handle);

        assert!(task.await.unwrap().is_ok());
        let mut rest = Vec::new();
        assert_eq!(server.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![frame(b"hello")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_inside_prefix() {
        let batch = vec![frame(b"hello")];
        let slices = build_remaining_slices(&batch, 1);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), LENGTH_PREFIX_SIZE - 1);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_build_remaining_slices_skips_empty_payload() {
        let batch = vec![frame(b""), frame(b"ab")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 3);

        let slices = build_remaining_slices(&batch, LENGTH_PREFIX_SIZE + 1);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), LENGTH_PREFIX_SIZE - 1);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| frame(b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), 5 * (LENGTH_PREFIX_SIZE + 3));
    }

    #[tokio::test]
    async fn test_write_batch_partial_writes() {
        let mut out = Trickle {
            out: Vec::new(),
            limit: 3,
        };
        let batch = vec![frame(b"hello"), frame(b""), frame(b"world")];

        write_batch(&mut out, &batch).await.unwrap();

        assert_eq!(
            out.out,
            b"\x00\x00\x00\x05hello\x00\x00\x00\x00\x00\x00\x00\x05world"
        );
    }
}
