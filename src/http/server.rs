//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to `Router::dispatch`
//! - Close responses a chain left open
//! - Emit `Close` when the client goes away mid-dispatch
//! - Bind to a listener and shut down gracefully

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, StatusCode},
    routing::any,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::events::{EventSender, RouterEvent};
use crate::http::{Request, Response};
use crate::lifecycle::shutdown;
use crate::routing::Router;

/// HTTP server wrapping a `Router`.
pub struct HttpServer {
    app: axum::Router,
    router: Arc<Router>,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self::from_shared(Arc::new(router))
    }

    pub fn from_shared(router: Arc<Router>) -> Self {
        let app = Self::build_app(Arc::clone(&router));
        Self { app, router }
    }

    fn build_app(router: Arc<Router>) -> axum::Router {
        axum::Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(router)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// The underlying Axum router, for embedding in another server.
    pub fn into_app(self) -> axum::Router {
        self.app
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Serve connections from `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(
    State(router): State<Arc<Router>>,
    request: axum::http::Request<Body>,
) -> axum::response::Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    respond(&router, request, peer).await
}

/// Run one transport request through `router`.
pub async fn respond(
    router: &Router,
    request: axum::http::Request<Body>,
    peer: Option<SocketAddr>,
) -> axum::response::Response {
    let mut req = Request::from_http(request, peer);
    let mut res = Response::new();
    let guard = InFlight::new(router.events(), req.method(), req.path());

    router.dispatch(&mut req, &mut res).await;

    if !res.is_sent() {
        tracing::warn!(
            method = %req.method(),
            path = %req.path(),
            "Middleware chain ended without a response"
        );
        res.error(StatusCode::INTERNAL_SERVER_ERROR);
    }

    guard.complete();
    router.finish(&req, &res);
    res.into_http()
}

/// Emits `Close` if dropped before the response completed.
struct InFlight {
    events: EventSender,
    method: Method,
    path: String,
    done: bool,
}

impl InFlight {
    fn new(events: &EventSender, method: &Method, path: &str) -> Self {
        Self {
            events: events.clone(),
            method: method.clone(),
            path: path.to_string(),
            done: false,
        }
    }

    fn complete(mut self) {
        self.done = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(method = %self.method, path = %self.path, "Connection closed mid-dispatch");
            self.events.emit(RouterEvent::Close {
                method: self.method.clone(),
                path: std::mem::take(&mut self.path),
            });
        }
    }
}
