//! Handler trait and handler results.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::GatewayError;

/// Result of running a handler.
pub type HandlerResult = Result<Reply, GatewayError>;

/// What a handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Serialized as `application/json; charset=utf-8`.
    Json(Value),
    /// Written as `text/html; charset=utf-8`.
    Html(String),
    /// No content. Leaves a [`RequestContext::custom`] response untouched,
    /// otherwise writes an empty HTML body.
    Empty,
}

impl Reply {
    /// Serialize any value into a JSON reply.
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self, GatewayError> {
        serde_json::to_value(data)
            .map(Self::Json)
            .map_err(GatewayError::handler)
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::Html(body.into())
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Self::Html(body)
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Self::Html(body.to_string())
    }
}

/// An async route handler.
///
/// Implemented for every `Fn(&mut RequestContext) -> BoxFuture<HandlerResult>`,
/// so closures can be registered directly:
///
/// ```ignore
/// handler_fn(|ctx| Box::pin(async move {
///     let name = ctx.get("name").unwrap_or_default();
///     Ok(json!({ "hello": name }).into())
/// }))
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
        (self)(ctx)
    }
}

/// Shared, type-erased handler stored in the route registry.
pub type BoxedHandler = Arc<dyn Handler>;

/// Box a closure as a [`BoxedHandler`]. Pins down the higher-ranked
/// signature so closure parameters need no annotations.
pub fn handler_fn<F>(f: F) -> BoxedHandler
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}
