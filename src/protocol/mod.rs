//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the length-prefixed framing:
//! - 4-byte length prefix encoding/decoding in either byte order
//! - Frame buffer for accumulating partial reads
//! - Frame struct wrapping a complete payload

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    ByteOrder, FramingConfig, LengthPrefix, ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE,
    LENGTH_PREFIX_SIZE,
};
