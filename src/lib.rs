//! Minimal HTTP gateway runtime.
//!
//! Accepts raw connections, resolves each request to a registered handler,
//! reads and decodes the body, runs the handler between interceptor hooks,
//! and writes the result or a mapped error envelope.

// Core pipeline
pub mod body;
pub mod context;
pub mod dispatch;
pub mod routing;

// Serving
pub mod app;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use app::{Gateway, Registrar};
pub use config::GatewayConfig;
pub use context::RequestContext;
pub use error::{ErrorEnvelope, GatewayError};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use routing::{handler_fn, Reply, RouteOptions, RouteTable};
