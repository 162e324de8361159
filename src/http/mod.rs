//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, catch-all route)
//!     → request.rs (framework-agnostic request handle)
//!     → [Router::dispatch runs the middleware chain]
//!     → response.rs (decorators, terminal write)
//!     → server.rs (convert back, access log, events)
//! ```

pub mod cors;
pub mod error;
pub mod range;
pub mod request;
pub mod response;
pub mod server;

pub use error::HttpError;
pub use request::Request;
pub use response::{Body, OnSend, Response};
pub use server::HttpServer;
