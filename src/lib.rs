//! # framecast
//!
//! Length-prefixed framed messages over byte streams, with one session per
//! connection and a registry that fans every received frame out to all live
//! sessions.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`], [`transport`]): a 4-byte length prefix
//!   (big endian unless configured) followed by exactly that many payload bytes
//! - **Sessions** ([`session`]): a read loop per connection, plus a writer
//!   task that owns the write half and serializes all writes
//! - **Registry** ([`registry`]): live sessions, join/leave, broadcast
//!
//! Payloads are opaque; [`codec::MsgPackCodec`] is provided for typed ones.
//!
//! ## Example
//!
//! ```no_run
//! use framecast::{handler::Broadcast, Server};
//!
//! #[tokio::main]
//! async fn main() -> framecast::error::Result<()> {
//!     let server = Server::builder()
//!         .handler(Broadcast::default())
//!         .bind(&"0.0.0.0:5000".parse()?)
//!         .await?;
//!
//!     server.run_until_ctrl_c().await
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod writer;

mod backpressure;
mod client;
mod server;

pub use client::Client;
pub use error::FramecastError;
pub use handler::{FrameContext, FrameHandler};
pub use registry::{DeliveryReport, MembershipEvent, Registry};
pub use server::{Server, ServerBuilder, DEFAULT_HANDSHAKE_TIMEOUT};
pub use session::{PendingSession, Session, SessionConfig, SessionId, SessionState};
