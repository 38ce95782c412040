//! Length-prefixed frame I/O over any async byte stream.
//!
//! Two ways to read:
//! - [`receive_frame`]: exact reads (prefix, then payload), no buffering
//! - [`FrameReader`]: reads arbitrary chunks into a [`FrameBuffer`]
//!
//! Both report an orderly disconnect as `Ok(None)`. A zero-length frame is
//! `Ok(Some(empty))`, never a disconnect.

use std::collections::VecDeque;
use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::Result;
use crate::protocol::{Frame, FrameBuffer, FramingConfig, LengthPrefix, LENGTH_PREFIX_SIZE};

/// Default read chunk size (64KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Write one frame: length prefix, then payload, then flush.
///
/// The exclusive borrow of `writer` keeps the two writes from interleaving
/// with any other frame. On success the whole frame has been handed to the
/// stream.
///
/// # Errors
///
/// `FrameTooLarge` if the payload does not fit the 32-bit length field,
/// `Io` if the stream fails.
pub async fn send_frame<W>(writer: &mut W, payload: &[u8], framing: &FramingConfig) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let prefix = LengthPrefix::for_payload(payload.len())?;
    writer.write_all(&prefix.encode(framing.byte_order)).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame.
///
/// Returns `Ok(None)` when the stream ends, whether before the prefix or in
/// the middle of a frame.
///
/// # Errors
///
/// `FrameTooLarge` if the prefix declares more than `framing.max_frame_size`
/// (checked before the payload buffer is allocated), `Io` for anything else.
pub async fn receive_frame<R>(reader: &mut R, framing: &FramingConfig) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = [0u8; LENGTH_PREFIX_SIZE];
    if !read_exact_or_eof(reader, &mut raw).await? {
        return Ok(None);
    }

    let prefix = LengthPrefix::from_bytes(raw, framing.byte_order);
    prefix.validate(framing.max_frame_size)?;

    if prefix.is_empty() {
        return Ok(Some(Bytes::new()));
    }

    let mut payload = BytesMut::zeroed(prefix.len());
    if !read_exact_or_eof(reader, &mut payload).await? {
        debug!(
            expected = prefix.len(),
            "stream ended inside a frame payload"
        );
        return Ok(None);
    }

    Ok(Some(payload.freeze()))
}

/// `read_exact` that maps end-of-stream to `Ok(false)`.
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Buffered frame reader.
///
/// Reads whatever the stream offers and hands out complete frames in arrival
/// order, however the bytes were split across reads.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    ready: VecDeque<Frame>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with the default 64KB chunk size.
    pub fn new(reader: R, framing: FramingConfig) -> Self {
        Self::with_capacity(reader, framing, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Create a reader with a custom chunk size.
    pub fn with_capacity(reader: R, framing: FramingConfig, read_buffer_size: usize) -> Self {
        let read_buffer_size = read_buffer_size.max(LENGTH_PREFIX_SIZE);
        Self {
            reader,
            buffer: FrameBuffer::with_capacity(read_buffer_size, framing),
            ready: VecDeque::new(),
            chunk: vec![0u8; read_buffer_size],
        }
    }

    /// Next complete frame, or `Ok(None)` once the stream has ended.
    ///
    /// Cancel safe: a frame is only removed from the internal queue when it
    /// is returned.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            self.buffer.check()?;

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.buffer.has_partial_frame() {
                    debug!(
                        buffered = self.buffer.len(),
                        "stream ended with a partial frame buffered"
                    );
                }
                return Ok(None);
            }

            self.ready.extend(self.buffer.push(&self.chunk[..n])?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramecastError;
    use crate::protocol::ByteOrder;

    #[tokio::test]
    async fn test_send_then_receive() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let framing = FramingConfig::default();

        send_frame(&mut a, b"hello", &framing).await.unwrap();
        let payload = receive_frame(&mut b, &framing).await.unwrap().unwrap();

        assert_eq!(&payload[..], b"hello");
    }

    #[tokio::test]
    async fn test_wire_bytes_big_endian() {
        let mut out = Vec::new();
        send_frame(&mut out, b"abc", &FramingConfig::default())
            .await
            .unwrap();
        assert_eq!(out, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_wire_bytes_little_endian() {
        let framing = FramingConfig::default().with_byte_order(ByteOrder::Little);
        let mut out = Vec::new();
        send_frame(&mut out, b"abc", &framing).await.unwrap();
        assert_eq!(out, [3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_not_disconnect() {
        let data: &[u8] = &[0, 0, 0, 0];
        let mut reader = data;
        let framing = FramingConfig::default();

        let first = receive_frame(&mut reader, &framing).await.unwrap();
        assert_eq!(first, Some(Bytes::new()));

        let second = receive_frame(&mut reader, &framing).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_eof_inside_prefix() {
        let data: &[u8] = &[0, 0];
        let mut reader = data;
        let result = receive_frame(&mut reader, &FramingConfig::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_payload() {
        let data: &[u8] = &[0, 0, 0, 10, b'a', b'b'];
        let mut reader = data;
        let result = receive_frame(&mut reader, &FramingConfig::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_oversize_rejected() {
        let data: &[u8] = &[0, 0, 1, 0];
        let mut reader = data;
        let framing = FramingConfig::default().with_max_frame_size(255);

        let result = receive_frame(&mut reader, &framing).await;
        assert!(matches!(
            result,
            Err(FramecastError::FrameTooLarge {
                declared: 256,
                max: 255
            })
        ));
    }

    #[tokio::test]
    async fn test_frame_reader_multiple_frames() {
        let mut wire = Vec::new();
        let framing = FramingConfig::default();
        for payload in [&b"one"[..], b"", b"three"] {
            send_frame(&mut wire, payload, &framing).await.unwrap();
        }

        let mut reader = FrameReader::with_capacity(&wire[..], framing, 4);
        let mut seen = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            seen.push(frame.into_payload());
        }

        assert_eq!(
            seen,
            vec![
                Bytes::from_static(b"one"),
                Bytes::new(),
                Bytes::from_static(b"three")
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_reader_eof_mid_frame() {
        let data: &[u8] = &[0, 0, 0, 9, b'x'];
        let mut reader = FrameReader::new(data, FramingConfig::default());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_reader_oversize() {
        let data: &[u8] = &[0, 1, 0, 0];
        let framing = FramingConfig::default().with_max_frame_size(1024);
        let mut reader = FrameReader::new(data, framing);

        let err = reader.next_frame().await.unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_frame_reader_yields_frames_before_violation() {
        let framing = FramingConfig::default().with_max_frame_size(16);
        let mut wire = crate::protocol::build_frame(b"ok", ByteOrder::Big).unwrap();
        wire.extend_from_slice(&LengthPrefix::new(1000).encode(ByteOrder::Big));

        // The peer stays connected, so the violation must surface without
        // another read.
        let (mut near, far) = tokio::io::duplex(1024);
        tokio::io::AsyncWriteExt::write_all(&mut near, &wire)
            .await
            .unwrap();
        let mut reader = FrameReader::new(far, framing);

        let wait = std::time::Duration::from_secs(5);
        let frame = tokio::time::timeout(wait, reader.next_frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload(), b"ok");

        let err = tokio::time::timeout(wait, reader.next_frame())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            FramecastError::FrameTooLarge { declared: 1000, max: 16 }
        ));
        drop(near);
    }
}
