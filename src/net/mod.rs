//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, destroy handle)
//!     → Hand off to HTTP layer (one request, then close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS terminates at the reverse proxy in front of the gateway

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionHandle, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
