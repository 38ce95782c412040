//! Transport module - byte streams and the framing that runs over them.
//!
//! Provides:
//! - [`send_frame`] / [`receive_frame`] / [`FrameReader`] over any async stream
//! - [`Endpoint`], [`Listener`], [`Stream`] for TCP and Unix Domain Sockets
//! - [`Handshake`] seam between accept and session establishment

mod endpoint;
mod framed;
mod handshake;

pub use endpoint::{Endpoint, Listener, Stream};
pub use framed::{receive_frame, send_frame, FrameReader, DEFAULT_READ_BUFFER_SIZE};
pub use handshake::{Handshake, Plain};
