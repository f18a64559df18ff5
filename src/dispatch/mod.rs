//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! hyper Request + ConnectionHandle
//!     → dispatcher.rs (route, read + decode body, hooks, handler)
//!     → interceptor.rs (request / response / response_error hooks)
//!     → Some(Response) or None when the connection was destroyed
//! ```
//!
//! # Design Decisions
//! - Errors are caught exactly once, at the dispatcher boundary
//! - Transport status is 200 for every business outcome
//! - Handler panics are contained and reported as handler errors

pub mod dispatcher;
pub mod interceptor;

pub use dispatcher::Dispatcher;
pub use interceptor::{Interceptor, NoopInterceptor};
