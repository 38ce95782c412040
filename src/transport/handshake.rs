//! Connection negotiation run before a session is established.
//!
//! A [`Handshake`] turns an accepted [`Stream`] into the stream the session
//! will read and write. TLS acceptors plug in here; [`Plain`] passes the
//! stream through untouched. A session joins its registry only after the
//! handshake succeeds.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Stream;
use crate::error::Result;
use crate::handler::BoxFuture;

/// Negotiation step between accept and session establishment.
pub trait Handshake: Send + Sync + 'static {
    /// Stream type produced by a successful handshake.
    type Output: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Run the handshake on a freshly accepted stream.
    fn handshake(&self, stream: Stream) -> BoxFuture<'static, Result<Self::Output>>;
}

/// No negotiation: the accepted stream is used as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl Handshake for Plain {
    type Output = Stream;

    fn handshake(&self, stream: Stream) -> BoxFuture<'static, Result<Stream>> {
        Box::pin(async move { Ok(stream) })
    }
}
