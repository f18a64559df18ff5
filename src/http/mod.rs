//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1, one request, destroy select)
//!     → tower-http layers (x-request-id, trace span)
//!     → service.rs (GatewayService → Dispatcher)
//!     → request.rs (content-length, forwarded headers)
//!     → response.rs (status, content type, cache control)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod service;

pub use server::GatewayServer;
pub use service::GatewayService;
