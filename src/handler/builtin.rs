//! Built-in frame handlers.

use std::future::Future;

use bytes::Bytes;

use super::{BoxFuture, FrameContext, FrameHandler, HandlerResult};

/// Who receives a broadcast frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryScope {
    /// Every live session, the sender included.
    #[default]
    All,
    /// Every live session except the sender.
    Others,
}

/// Chat-room handler: fans every frame out to the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcast {
    scope: DeliveryScope,
}

impl Broadcast {
    /// Broadcast with the given scope.
    pub fn new(scope: DeliveryScope) -> Self {
        Self { scope }
    }

    /// Broadcast to everyone except the sender.
    pub fn excluding_sender() -> Self {
        Self::new(DeliveryScope::Others)
    }

    /// Configured scope.
    pub fn scope(&self) -> DeliveryScope {
        self.scope
    }
}

impl FrameHandler for Broadcast {
    fn on_frame(&self, ctx: FrameContext, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        let _report = match self.scope {
            DeliveryScope::All => ctx.broadcast(payload),
            DeliveryScope::Others => ctx.broadcast_others(payload),
        };
        Box::pin(async { Ok(()) })
    }
}

/// Request/response handler: sends every frame back to its sender only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl FrameHandler for Echo {
    fn on_frame(&self, ctx: FrameContext, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async move { ctx.reply(payload).await })
    }
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `Fn(FrameContext, Bytes) -> impl Future<Output = HandlerResult>`
/// as a [`FrameHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(FrameContext, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> FrameHandler for FnHandler<F>
where
    F: Fn(FrameContext, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn on_frame(&self, ctx: FrameContext, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(ctx, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_defaults_to_all() {
        assert_eq!(Broadcast::default().scope(), DeliveryScope::All);
        assert_eq!(Broadcast::excluding_sender().scope(), DeliveryScope::Others);
    }
}
