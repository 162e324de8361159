//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router::finish (one call per response)
//!     → logging.rs (access log line, target `woodland::access`)
//!     → metrics.rs (request counter, latency histogram)
//!
//! RouteResolver cache miss
//!     → metrics.rs (cache miss counter)
//! ```
//!
//! # Design Decisions
//! - Diagnostics go through `tracing` with structured fields
//! - Metrics go through the `metrics` facade; Prometheus is optional
//! - Nothing here blocks dispatch

pub mod logging;
pub mod metrics;
