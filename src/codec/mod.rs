//! Codec module - typed payloads on top of opaque frames.
//!
//! Frames carry bytes; the transport never looks inside them. This module
//! turns serde types into frame payloads and back:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (struct-as-map)
//!
//! # Example
//!
//! ```
//! use framecast::codec::MsgPackCodec;
//!
//! let payload = MsgPackCodec::encode_bytes(&("alice", 3u8)).unwrap();
//! let (name, n): (String, u8) = MsgPackCodec::decode(&payload).unwrap();
//! assert_eq!((name.as_str(), n), ("alice", 3));
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
