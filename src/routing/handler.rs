//! Middleware handler types.
//!
//! # Design Decisions
//! - Normal handlers and error handlers are distinct variants, chosen at
//!   registration, never inferred from a signature
//! - Returning `Ok(Flow::Next)` plays the role of `next()`, returning
//!   `Err(e)` plays the role of `next(err)`
//! - Handler identity is the address of its shared allocation, so clones of
//!   one `Handler` are the same handler for the ignore set

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{HttpError, Request, Response};

/// Boxed future returned by closure handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler asks the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Advance to the next handler.
    Next,
    /// Do not advance; the handler owns the rest of the exchange.
    Stop,
}

/// Result of running one handler.
pub type Outcome = Result<Flow, HttpError>;

/// A normal `(req, res, next)` handler.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn call(&self, req: &mut Request, res: &mut Response) -> Outcome;
}

/// An `(err, req, res, next)` handler, entered only while an error is pending.
#[async_trait]
pub trait ErrorMiddleware: Send + Sync + 'static {
    async fn call(&self, err: HttpError, req: &mut Request, res: &mut Response) -> Outcome;
}

/// Stable identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

/// A handler registered on a route.
#[derive(Clone)]
pub enum Handler {
    Normal(Arc<dyn Middleware>),
    Error(Arc<dyn ErrorMiddleware>),
}

impl Handler {
    /// Wrap a `Middleware` implementation.
    pub fn from_middleware(middleware: impl Middleware) -> Self {
        Handler::Normal(Arc::new(middleware))
    }

    /// Wrap an `ErrorMiddleware` implementation.
    pub fn from_error_middleware(middleware: impl ErrorMiddleware) -> Self {
        Handler::Error(Arc::new(middleware))
    }

    pub fn id(&self) -> HandlerId {
        let ptr = match self {
            Handler::Normal(m) => Arc::as_ptr(m) as *const (),
            Handler::Error(m) => Arc::as_ptr(m) as *const (),
        };
        HandlerId(ptr as usize)
    }

    pub fn is_error_handler(&self) -> bool {
        matches!(self, Handler::Error(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_error_handler() { "Error" } else { "Normal" };
        write!(f, "Handler::{}({:#x})", kind, self.id().0)
    }
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    async fn call(&self, req: &mut Request, res: &mut Response) -> Outcome {
        (self.0)(req, res).await
    }
}

struct FnErrorMiddleware<F>(F);

#[async_trait]
impl<F> ErrorMiddleware for FnErrorMiddleware<F>
where
    F: for<'a> Fn(HttpError, &'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    async fn call(&self, err: HttpError, req: &mut Request, res: &mut Response) -> Outcome {
        (self.0)(err, req, res).await
    }
}

/// Build a normal handler from a closure.
///
/// ```ignore
/// let hello = handler(|_req, res| Box::pin(async move {
///     res.send("hello");
///     Ok(Flow::Stop)
/// }));
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    Handler::Normal(Arc::new(FnMiddleware(f)))
}

/// Build an error handler from a closure.
pub fn error_handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(HttpError, &'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    Handler::Error(Arc::new(FnErrorMiddleware(f)))
}
