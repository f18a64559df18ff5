//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline produces:
//!     → logging.rs (structured log events, access log lines)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached by tower-http and carried in the
//!   request context so every log line for a request can be correlated
//! - Metrics are cheap (atomic increments); the exporter is optional

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, ACCESS_LOG_TARGET};
