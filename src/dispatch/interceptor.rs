//! Hooks around handler execution.

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{ErrorEnvelope, GatewayError};
use crate::routing::Reply;

/// Cross-cutting hooks run by the dispatcher. Every hook defaults to a no-op.
pub trait Interceptor: Send + Sync + 'static {
    /// Runs after the body is decoded, before the handler. An error skips
    /// the handler and goes straight to error mapping.
    fn request<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs after a successful handler. `Some` replaces the handler's reply.
    fn response<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
        _reply: &'a Reply,
    ) -> BoxFuture<'a, Result<Option<Reply>, GatewayError>> {
        Box::pin(async { Ok(None) })
    }

    /// Runs on every mapped error. `Some` replaces the JSON written to the client.
    fn response_error<'a>(
        &'a self,
        _envelope: &'a ErrorEnvelope,
        _error: &'a GatewayError,
    ) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async { None })
    }
}

/// Interceptor that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterceptor;

impl Interceptor for NoopInterceptor {}
