//! Wire format encoding and decoding.
//!
//! Every frame is a fixed-width length prefix followed by exactly that many
//! payload bytes:
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ Length       │ Payload                  │
//! │ 4 bytes u32  │ `Length` opaque bytes    │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! No magic number, version field or checksum. The prefix is Big Endian
//! unless both peers agree on [`ByteOrder::Little`].

use crate::error::{FramecastError, Result};

/// Length prefix size in bytes (fixed, exactly 4).
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size accepted from a peer (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Largest payload the prefix can describe.
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = u32::MAX;

/// Byte order of the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network order. The default.
    #[default]
    Big,
    /// Little endian, for peers that write the host order of x86 machines.
    Little,
}

impl ByteOrder {
    /// The byte order of the machine we are running on.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Framing parameters both peers must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingConfig {
    /// Byte order of the length prefix.
    pub byte_order: ByteOrder,
    /// Largest payload accepted from the peer. Checked before allocating.
    pub max_frame_size: u32,
}

impl FramingConfig {
    /// Set the byte order.
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Set the maximum accepted payload size.
    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Decoded length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl LengthPrefix {
    /// Create a new prefix.
    pub fn new(payload_length: u32) -> Self {
        Self { payload_length }
    }

    /// Prefix for a payload of `len` bytes.
    ///
    /// Fails only if `len` does not fit the 32-bit length field.
    pub fn for_payload(len: usize) -> Result<Self> {
        let payload_length = u32::try_from(len).map_err(|_| FramecastError::FrameTooLarge {
            declared: len as u64,
            max: ABSOLUTE_MAX_FRAME_SIZE,
        })?;
        Ok(Self::new(payload_length))
    }

    /// Encode the prefix to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use framecast::protocol::{ByteOrder, LengthPrefix};
    ///
    /// let prefix = LengthPrefix::new(258);
    /// assert_eq!(prefix.encode(ByteOrder::Big), [0, 0, 1, 2]);
    /// assert_eq!(prefix.encode(ByteOrder::Little), [2, 1, 0, 0]);
    /// ```
    pub fn encode(&self, order: ByteOrder) -> [u8; LENGTH_PREFIX_SIZE] {
        match order {
            ByteOrder::Big => self.payload_length.to_be_bytes(),
            ByteOrder::Little => self.payload_length.to_le_bytes(),
        }
    }

    /// Decode a prefix from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8], order: ByteOrder) -> Option<Self> {
        let raw: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(raw, order))
    }

    /// Decode a prefix from exactly four bytes.
    pub fn from_bytes(raw: [u8; LENGTH_PREFIX_SIZE], order: ByteOrder) -> Self {
        let payload_length = match order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        };
        Self { payload_length }
    }

    /// Reject declarations larger than `max_frame_size`.
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.payload_length > max_frame_size {
            return Err(FramecastError::FrameTooLarge {
                declared: u64::from(self.payload_length),
                max: max_frame_size,
            });
        }
        Ok(())
    }

    /// Payload length as a buffer size.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload_length as usize
    }

    /// Whether this prefix announces an empty payload.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload_length == 0
    }
}
