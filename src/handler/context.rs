//! Context passed to frame handlers.
//!
//! - `reply` - send a frame back to the sender (waits for queue space)
//! - `broadcast` - queue a frame on every live session, sender included
//! - `broadcast_others` - same, sender excluded
//!
//! # Example
//!
//! ```
//! use framecast::handler::{handler_fn, FrameContext};
//!
//! let greeter = handler_fn(|ctx: FrameContext, _payload| async move {
//!     ctx.reply_encoded(&format!("you are session {}", ctx.session_id())).await
//! });
//! # let _ = greeter;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::registry::{DeliveryReport, Registry};
use crate::session::{Session, SessionId};

/// Handle on the session that received a frame.
///
/// Cheap to clone; holds the session alive while in use.
#[derive(Clone)]
pub struct FrameContext {
    session: Arc<Session>,
}

impl FrameContext {
    /// Context for a frame received on `session`.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// The receiving session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Id of the receiving session.
    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Peer label of the receiving session.
    #[inline]
    pub fn peer(&self) -> &str {
        self.session.peer()
    }

    /// Registry the session belongs to.
    pub fn registry(&self) -> &Arc<Registry> {
        self.session.registry()
    }

    /// Send a frame to the sender only.
    pub async fn reply(&self, payload: Bytes) -> Result<()> {
        self.session.send(payload).await
    }

    /// Encode `value` as MsgPack and send it to the sender.
    pub async fn reply_encoded<T: Serialize>(&self, value: &T) -> Result<()> {
        let data = MsgPackCodec::encode(value)?;
        self.reply(Bytes::from(data)).await
    }

    /// Queue a frame on every live session, the sender included.
    pub fn broadcast(&self, payload: Bytes) -> DeliveryReport {
        self.registry().deliver(payload)
    }

    /// Queue a frame on every live session except the sender.
    pub fn broadcast_others(&self, payload: Bytes) -> DeliveryReport {
        self.registry().deliver_except(payload, self.session_id())
    }
}

impl std::fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("session", &self.session.id())
            .finish()
    }
}
