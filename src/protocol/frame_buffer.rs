//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForPrefix`: Need at least 4 bytes
//! - `WaitingForPayload`: Prefix parsed, need N more payload bytes
//!
//! The declared length is checked against `max_frame_size` before any
//! payload space is reserved.
//!
//! # Example
//!
//! ```
//! use framecast::protocol::{FrameBuffer, FramingConfig};
//!
//! let mut buffer = FrameBuffer::new(FramingConfig::default());
//!
//! // Prefix split across two socket reads
//! assert!(buffer.push(&[0]).unwrap().is_empty());
//! let frames = buffer.push(&[0, 0, 2, b'h', b'i']).unwrap();
//!
//! assert_eq!(frames[0].payload(), b"hi");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{FramingConfig, LengthPrefix, LENGTH_PREFIX_SIZE};
use super::Frame;
use crate::error::Result;

/// Initial buffer capacity (64KB).
const DEFAULT_CAPACITY: usize = 64 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete length prefix (need 4 bytes).
    WaitingForPrefix,
    /// Prefix parsed, waiting for payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Byte order and size limit.
    framing: FramingConfig,
}

impl FrameBuffer {
    /// Create a new frame buffer with a 64KB initial capacity.
    pub fn new(framing: FramingConfig) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, framing)
    }

    /// Create a new frame buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize, framing: FramingConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForPrefix,
            framing,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the complete frames in arrival order (may be empty if still
    /// waiting for data). Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns `FrameTooLarge` if the next prefix exceeds `max_frame_size`
    /// and no frame completed before it. Frames that did complete are
    /// returned first; the rejected prefix stays buffered, so the error is
    /// reported by [`FrameBuffer::check`] and by every later push. The
    /// connection should be dropped once it surfaces.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.try_extract_one() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(e) if frames.is_empty() => return Err(e),
                Err(_) => return Ok(frames),
            }
        }
    }

    /// Fail if the buffered prefix has already been rejected.
    ///
    /// Lets a reader surface a violation that arrived behind complete
    /// frames without waiting for more input.
    pub fn check(&self) -> Result<()> {
        if let State::WaitingForPrefix = self.state {
            if let Some(prefix) = LengthPrefix::decode(&self.buffer, self.framing.byte_order) {
                prefix.validate(self.framing.max_frame_size)?;
            }
        }
        Ok(())
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the declared length is too large
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForPrefix => {
                    let Some(prefix) =
                        LengthPrefix::decode(&self.buffer, self.framing.byte_order)
                    else {
                        return Ok(None);
                    };
                    prefix.validate(self.framing.max_frame_size)?;

                    let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);

                    if prefix.is_empty() {
                        return Ok(Some(Frame::new(Bytes::new())));
                    }

                    let remaining = prefix.len();
                    if self.buffer.capacity() < remaining {
                        self.buffer.reserve(remaining - self.buffer.len());
                    }
                    self.state = State::WaitingForPayload { remaining };
                }

                State::WaitingForPayload { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForPrefix;

                    return Ok(Some(Frame::new(payload)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame has started arriving but is not complete yet.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForPrefix => "WaitingForPrefix",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(FramingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramecastError;
    use crate::protocol::{build_frame, ByteOrder};

    fn make_frame_bytes(payload: &[u8]) -> Vec<u8> {
        build_frame(payload, ByteOrder::Big).unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::default();

        let frames = buffer.push(&make_frame_bytes(b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::default();

        let mut combined = make_frame_bytes(b"first");
        combined.extend(make_frame_bytes(b"second"));
        combined.extend(make_frame_bytes(b"third"));

        let frames = buffer.push(&combined).unwrap();

        let payloads: Vec<&[u8]> = frames.iter().map(|f| f.payload()).collect();
        assert_eq!(payloads, vec![&b"first"[..], b"second", b"third"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_prefix_split_one_then_three() {
        let mut buffer = FrameBuffer::default();
        let frame_bytes = make_frame_bytes(b"split");

        assert!(buffer.push(&frame_bytes[..1]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPrefix");
        assert!(buffer.has_partial_frame());

        assert!(buffer.push(&frame_bytes[1..4]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let frames = buffer.push(&frame_bytes[4..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"split");
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::default();
        let payload = b"this is a longer payload that will be fragmented";
        let frame_bytes = make_frame_bytes(payload);

        let partial_len = LENGTH_PREFIX_SIZE + 10;
        assert!(buffer.push(&frame_bytes[..partial_len]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let frames = buffer.push(&frame_bytes[partial_len..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), payload);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_payload_is_a_frame() {
        let mut buffer = FrameBuffer::default();

        let frames = buffer.push(&make_frame_bytes(b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPrefix");
    }

    #[test]
    fn test_large_payload() {
        let mut buffer = FrameBuffer::default();
        let payload = vec![0xAB; 1024 * 1024];

        let frames = buffer.push(&make_frame_bytes(&payload)).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload().len(), 1024 * 1024);
        assert!(frames[0].payload().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_max_frame_size_rejected_before_payload() {
        let framing = FramingConfig::default().with_max_frame_size(100);
        let mut buffer = FrameBuffer::new(framing);

        // Only the prefix arrives; the claim alone is enough to reject.
        let prefix = LengthPrefix::new(1000).encode(ByteOrder::Big);
        let result = buffer.push(&prefix);

        assert!(matches!(
            result,
            Err(FramecastError::FrameTooLarge {
                declared: 1000,
                max: 100
            })
        ));
    }

    #[test]
    fn test_frames_before_oversize_prefix_are_kept() {
        let framing = FramingConfig::default().with_max_frame_size(16);
        let mut buffer = FrameBuffer::new(framing);

        let mut data = make_frame_bytes(b"ok");
        data.extend_from_slice(&LengthPrefix::new(1000).encode(ByteOrder::Big));

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"ok");

        assert!(matches!(
            buffer.check(),
            Err(FramecastError::FrameTooLarge { declared: 1000, max: 16 })
        ));
        assert!(matches!(
            buffer.push(&[]),
            Err(FramecastError::FrameTooLarge { declared: 1000, max: 16 })
        ));
    }

    #[test]
    fn test_check_waits_for_full_prefix() {
        let framing = FramingConfig::default().with_max_frame_size(16);
        let mut buffer = FrameBuffer::new(framing);

        buffer.push(&[0, 0]).unwrap();
        assert!(buffer.check().is_ok());
    }

    #[test]
    fn test_little_endian_framing() {
        let framing = FramingConfig::default().with_byte_order(ByteOrder::Little);
        let mut buffer = FrameBuffer::new(framing);

        let frames = buffer.push(&[2, 0, 0, 0, b'o', b'k']).unwrap();
        assert_eq!(frames[0].payload(), b"ok");
    }

    #[test]
    fn test_partial_payload_is_buffered() {
        let mut buffer = FrameBuffer::default();
        let frame_bytes = make_frame_bytes(b"test");

        buffer.push(&frame_bytes[..LENGTH_PREFIX_SIZE + 1]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");
        assert_eq!(buffer.len(), 1);
        assert!(buffer.has_partial_frame());
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::default();

        let frame1 = make_frame_bytes(b"first");
        let frame2 = make_frame_bytes(b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..2]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"first");
        assert_eq!(buffer.state_name(), "WaitingForPrefix");

        let frames = buffer.push(&frame2[2..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"second");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::default();
        let frame_bytes = make_frame_bytes(b"hi");

        let mut all_frames = Vec::new();
        for byte in &frame_bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].payload(), b"hi");
    }
}
