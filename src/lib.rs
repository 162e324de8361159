//! Embeddable HTTP router and middleware dispatcher.
//!
//! ```ignore
//! use woodland::{handler, Flow, Router};
//!
//! let mut router = Router::default();
//! router.get("/users/:id", vec![handler(|req, res| Box::pin(async move {
//!     res.json(&serde_json::json!({ "id": req.param("id") }));
//!     Ok(Flow::Stop)
//! }))])?;
//! ```

pub mod config;
pub mod events;
pub mod files;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod util;

pub use config::RouterConfig;
pub use events::RouterEvent;
pub use http::{HttpError, HttpServer, Request, Response};
pub use lifecycle::Shutdown;
pub use routing::{error_handler, handler, Flow, Handler, ListFormat, Router, RouterError};
