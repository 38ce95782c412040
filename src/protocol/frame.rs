//! Frame struct and frame builders.
//!
//! A frame is the unit handed to the application: its payload is always
//! complete. Uses `bytes::Bytes` so one payload can be fanned out to many
//! sessions without copying.
//!
//! # Example
//!
//! ```
//! use framecast::protocol::Frame;
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"hello"));
//! assert_eq!(frame.payload(), b"hello");
//! assert!(!frame.is_empty());
//! ```

use bytes::Bytes;

use super::wire_format::{ByteOrder, LengthPrefix, LENGTH_PREFIX_SIZE};
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from a payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame, returning its payload.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Whether the payload is empty (a valid zero-length frame).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl From<Bytes> for Frame {
    fn from(payload: Bytes) -> Self {
        Self::new(payload)
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use framecast::protocol::{build_frame, ByteOrder};
///
/// let bytes = build_frame(b"hello", ByteOrder::Big).unwrap();
/// assert_eq!(bytes, [0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);
/// ```
pub fn build_frame(payload: &[u8], order: ByteOrder) -> Result<Vec<u8>> {
    let prefix = LengthPrefix::for_payload(payload.len())?;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&prefix.encode(order));
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(Bytes::from_static(b"hello"));

        assert_eq!(frame.payload(), b"hello");
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = Frame::new(Bytes::new());

        assert!(frame.is_empty());
        assert_eq!(frame.payload(), b"");
    }

    #[test]
    fn test_into_payload_zero_copy() {
        let original = Bytes::from_static(b"test data");
        let frame = Frame::from(original.clone());

        assert_eq!(frame.payload().as_ptr(), original.as_ptr());
        assert_eq!(frame.into_payload().as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_build_frame_little_endian() {
        let bytes = build_frame(b"abc", ByteOrder::Little).unwrap();
        assert_eq!(bytes, [3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let bytes = build_frame(b"", ByteOrder::Big).unwrap();
        assert_eq!(bytes, [0, 0, 0, 0]);
    }

    #[test]
    fn test_build_frame_roundtrip_through_buffer() {
        use super::super::{FrameBuffer, FramingConfig};

        let bytes = build_frame(b"0123456789", ByteOrder::Big).unwrap();
        let mut buffer = FrameBuffer::new(FramingConfig::default());
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames, vec![Frame::from(Bytes::from_static(b"0123456789"))]);
    }
}
