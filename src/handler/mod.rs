//! Handler module - what a session does with each received frame.
//!
//! Provides:
//! - [`FrameHandler`] - called once per frame, in arrival order
//! - [`FrameContext`] - reply to the sender or fan out to the registry
//! - Built-ins: [`Broadcast`] (the chat room) and [`Echo`]
//! - [`handler_fn`] - adapt an async closure
//!
//! # Example
//!
//! ```
//! use framecast::handler::handler_fn;
//!
//! let shout = handler_fn(|ctx, payload| async move {
//!     let upper = payload.to_ascii_uppercase();
//!     ctx.broadcast(upper.into());
//!     Ok(())
//! });
//! # let _ = shout;
//! ```

mod builtin;
mod context;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

pub use builtin::{handler_fn, Broadcast, DeliveryScope, Echo, FnHandler};
pub use context::FrameContext;

use crate::error::Result;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Called by a session's read loop for every received frame.
///
/// The read loop awaits the returned future before reading the next frame.
/// An `Err` is logged; it does not close the session.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one complete frame payload (possibly empty).
    fn on_frame(&self, ctx: FrameContext, payload: Bytes) -> BoxFuture<'static, HandlerResult>;
}
