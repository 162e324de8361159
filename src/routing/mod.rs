//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     route(method, pattern, handlers)
//!     → pattern.rs (compile `:name` segments)
//!     → registry.rs (append to the method's entry for that pattern)
//!
//! Dispatch (per request):
//!     path + method
//!     → permissions.rs (Allow string, cached per path)
//!     → resolver.rs (matched chain, cached per method + path)
//!     → router.rs (walk the chain with a cursor)
//! ```
//!
//! # Design Decisions
//! - Registries belong to a `Router` instance, never to the process
//! - Matching is exact over anchored expressions, in registration order
//! - Wildcard-method handlers run before method-specific ones

pub mod handler;
pub mod pattern;
pub mod permissions;
pub mod registry;
pub mod resolver;
pub mod router;

pub use handler::{error_handler, handler, ErrorMiddleware, Flow, Handler, Middleware, Outcome};
pub use registry::{MethodKey, RouterError, WILDCARD};
pub use resolver::ResolvedRoute;
pub use router::{ListFormat, RouteList, Router};
