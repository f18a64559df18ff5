//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     route module fn(&mut Registrar)
//!     → RouteTable (path → options + handler)
//!     → router.rs register (skip incomplete, prefix base URL)
//!     → Freeze as immutable Router
//!
//! Per request (method, url)
//!     → router.rs lookup (exact, then last-segment wildcard)
//!     → Return: RouteMatch or NotFound / MethodNotAllowed
//! ```
//!
//! # Design Decisions
//! - Registration context is passed explicitly, never held as ambient state
//! - No regex and no multi-segment patterns
//! - Deterministic: same input always matches same route

pub mod handler;
pub mod route;
pub mod router;

pub use handler::{handler_fn, BoxedHandler, Handler, HandlerResult, Reply};
pub use route::{
    start_case, MethodFilter, RegistrationContext, RouteLayer, RouteOptions, RouteSpec, RouteTable,
};
pub use router::{RouteMatch, RouteParams, Router};
