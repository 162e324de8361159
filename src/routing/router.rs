//! The router: registration surface, introspection and dispatch.
//!
//! # Dispatch states
//! ```text
//! RECEIVED → DECORATED → RESOLVED → DISPATCHING → COMPLETED
//!                      ↘ REJECTED (403 / 404 / 405 / 204 preflight)
//! ```
//!
//! # Design Decisions
//! - Registration takes `&mut self` and happens before traffic; dispatch
//!   takes `&self` so one router can be shared behind an `Arc`
//! - The chain walk is an explicit cursor over an immutable resolved route;
//!   every handler invocation is preceded by a yield to the runtime
//! - An error raised by a handler skips to the next error handler; with none
//!   left the response is closed with a status derived from the error

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use chrono::Utc;
use serde::Serialize;
use serde_json::Map;
use tokio::sync::broadcast;

use crate::config::RouterConfig;
use crate::events::{EventSender, RouterEvent};
use crate::files::StaticFiles;
use crate::http::request::client_ip;
use crate::http::response::{OnSend, ResponseContext};
use crate::http::{cors, HttpError, Request, Response};
use crate::observability::logging::AccessEntry;
use crate::observability::metrics;
use crate::routing::handler::{handler, Flow, Handler};
use crate::routing::pattern;
use crate::routing::permissions::PermissionResolver;
use crate::routing::registry::{MethodKey, MiddlewareRegistry, RouterError, WILDCARD};
use crate::routing::resolver::{ResolvedRoute, RouteResolver};
use crate::util;

/// Shape of `Router::list` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// Patterns in registration order.
    Array,
    /// Pattern to handler count.
    Object,
}

/// Registered routes of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RouteList {
    Array(Vec<String>),
    Object(BTreeMap<String, usize>),
}

/// An HTTP router instance.
pub struct Router {
    config: RouterConfig,
    registry: MiddlewareRegistry,
    resolver: RouteResolver,
    permissions: PermissionResolver,
    default_headers: HeaderMap,
    on_send: Option<OnSend>,
    events: EventSender,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let ttl = Duration::from_millis(config.cache_ttl_ms.max(1));
        let default_headers = default_headers(&config);

        Self {
            resolver: RouteResolver::new(config.cache_size, ttl),
            permissions: PermissionResolver::new(config.cache_size, ttl),
            registry: MiddlewareRegistry::new(),
            default_headers,
            on_send: None,
            events: EventSender::new(),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // -- registration -----------------------------------------------------

    /// Register `handlers` for `method` (`"*"` for every method) on
    /// `pattern`, which defaults to matching every path.
    pub fn route(
        &mut self,
        method: &str,
        pattern: Option<&str>,
        handlers: Vec<Handler>,
    ) -> Result<&mut Self, RouterError> {
        self.registry.register(method, pattern, handlers)?;
        Ok(self)
    }

    /// Register for every method.
    pub fn always(
        &mut self,
        pattern: Option<&str>,
        handlers: Vec<Handler>,
    ) -> Result<&mut Self, RouterError> {
        self.route(WILDCARD, pattern, handlers)
    }

    pub fn get(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("GET", Some(pattern), handlers)
    }

    pub fn post(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("POST", Some(pattern), handlers)
    }

    pub fn put(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("PUT", Some(pattern), handlers)
    }

    pub fn delete(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("DELETE", Some(pattern), handlers)
    }

    pub fn patch(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("PATCH", Some(pattern), handlers)
    }

    pub fn options(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("OPTIONS", Some(pattern), handlers)
    }

    pub fn trace(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("TRACE", Some(pattern), handlers)
    }

    pub fn connect(&mut self, pattern: &str, handlers: Vec<Handler>) -> Result<&mut Self, RouterError> {
        self.route("CONNECT", Some(pattern), handlers)
    }

    /// Serve the directory `root` under the URL `prefix`.
    pub fn files(&mut self, prefix: &str, root: impl Into<PathBuf>) -> Result<&mut Self, RouterError> {
        let trimmed = prefix.trim_end_matches('/');
        let mount = if trimmed.is_empty() {
            pattern::MATCH_ALL.to_string()
        } else {
            format!("{}(/.*)?", regex::escape(trimmed))
        };

        let files = Arc::new(StaticFiles::new(trimmed, root.into(), &self.config));
        tracing::info!(prefix = %prefix, root = %files.root().display(), "Mounting static files");

        let serve = handler(move |req, res| {
            let files = Arc::clone(&files);
            Box::pin(async move { files.serve(req, res).await })
        });
        self.route("GET", Some(&mount), vec![serve])
    }

    /// Exclude `handler` from the counts that decide allowed methods.
    pub fn ignore(&mut self, handler: &Handler) -> &mut Self {
        self.registry.ignore(handler);
        self
    }

    /// Run `hook` on every response right before it is written.
    pub fn on_send<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Response) + Send + Sync + 'static,
    {
        self.on_send = Some(Arc::new(hook));
        self
    }

    /// Receive router events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    // -- introspection ----------------------------------------------------

    /// True if `method` has visible handlers for `uri`. HEAD follows GET.
    pub fn allowed(&self, method: &str, uri: &str, refresh: bool) -> bool {
        let Ok(mut key) = MethodKey::parse(method) else {
            return false;
        };
        if key == MethodKey::Named(Method::HEAD) {
            key = MethodKey::Named(Method::GET);
        }
        self.permissions
            .allowed(&self.registry, &self.resolver, &key, uri, refresh)
    }

    /// The `Allow` string for `uri`.
    pub fn allows(&self, uri: &str, refresh: bool) -> String {
        self.permissions
            .allows(&self.registry, &self.resolver, uri, refresh)
            .to_string()
    }

    /// The handler chain `method` resolves to for `uri`.
    pub fn routes(
        &self,
        uri: &str,
        method: &str,
        refresh: bool,
    ) -> Result<Arc<ResolvedRoute>, RouterError> {
        let key = MethodKey::parse(method)?;
        Ok(self.resolver.resolve(&self.registry, uri, &key, refresh))
    }

    /// Patterns registered for `method`.
    pub fn list(&self, method: &str, format: ListFormat) -> Result<RouteList, RouterError> {
        let key = MethodKey::parse(method)?;
        let entries = self.registry.entries(&key);

        Ok(match format {
            ListFormat::Array => RouteList::Array(
                entries
                    .iter()
                    .map(|e| e.pattern.source().to_string())
                    .collect(),
            ),
            ListFormat::Object => RouteList::Object(
                entries
                    .iter()
                    .map(|e| (e.pattern.source().to_string(), e.handlers.len()))
                    .collect(),
            ),
        })
    }

    /// The anchored expression `pattern` compiles to.
    pub fn path(&self, pattern: &str) -> String {
        pattern::compile(pattern).expression().to_string()
    }

    // -- dispatch ---------------------------------------------------------

    /// Route one request through its middleware chain.
    pub async fn dispatch(&self, req: &mut Request, res: &mut Response) {
        self.decorate(req, res);

        let Some(route) = self.select(req, res) else {
            return;
        };

        if let Some(matcher) = &route.params {
            let params = matcher
                .captures(req.path())
                .into_iter()
                .map(|(name, raw)| {
                    let value = urlencoding::decode(&raw)
                        .map(Cow::into_owned)
                        .unwrap_or(raw);
                    (name, util::coerce(&value))
                })
                .collect::<Map<_, _>>();
            req.set_params(params);
        }

        self.run_chain(&route, req, res).await;
    }

    /// Record a finished exchange: access log, metrics, `Finish` event.
    pub fn finish(&self, req: &Request, res: &Response) {
        let status = res.status_code();

        if self.config.logging.enabled {
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            let length = res
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());

            let line = AccessEntry {
                ip: req.ip(),
                time: Utc::now(),
                method: req.method(),
                target,
                version: req.version(),
                status,
                length,
                request_headers: req.headers(),
                response_headers: res.headers(),
            }
            .render(&self.config.logging.format);
            tracing::info!(target: "woodland::access", "{line}");
        }

        metrics::record_request(req.method().as_str(), status.as_u16(), req.started());

        self.events.emit(RouterEvent::Finish {
            method: req.method().clone(),
            path: req.path().to_string(),
            status,
            ip: req.ip().to_string(),
        });
    }

    pub(crate) fn events(&self) -> &EventSender {
        &self.events
    }

    fn decorate(&self, req: &mut Request, res: &mut Response) {
        let ip = client_ip(req.headers(), req.peer());
        let cors_host = cors::is_cross_origin(req.headers());
        let origin = cors::origin(req.headers()).map(str::to_string);
        let cors = cors_host
            && origin
                .as_deref()
                .is_some_and(|o| cors::is_allowed(&self.config.origins, o));
        let allow = self
            .permissions
            .allows(&self.registry, &self.resolver, req.path(), false);

        req.set_context(ip, cors_host, cors, Arc::clone(&allow));

        res.attach(ResponseContext {
            method: req.method().clone(),
            path: req.path().to_string(),
            range: req.header(header::RANGE).map(str::to_string),
            if_none_match: req.header(header::IF_NONE_MATCH).map(str::to_string),
            cors,
            etags: self.config.etags,
            time: self.config.time,
            digit: self.config.digit,
            charset: self.config.charset.clone(),
            started: Some(req.started()),
            on_send: self.on_send.clone(),
            events: Some(self.events.clone()),
        });

        res.headers_mut().extend(self.default_headers.clone());
        res.header(header::ALLOW, &allow);

        if let (true, Some(origin)) = (cors, origin.as_deref()) {
            res.header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)
                .header(HeaderName::from_static("timing-allow-origin"), origin)
                .header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
                .header(header::ACCESS_CONTROL_ALLOW_METHODS, &allow);

            if req.method() == Method::OPTIONS {
                if let Some(requested) = req.header(header::ACCESS_CONTROL_REQUEST_HEADERS) {
                    res.header(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
                }
            }
        }

        tracing::debug!(
            method = %req.method(),
            path = %req.path(),
            ip = %req.ip(),
            allow = %allow,
            "Request decorated"
        );
        self.events.emit(RouterEvent::Connect {
            method: req.method().clone(),
            path: req.path().to_string(),
            ip: req.ip().to_string(),
        });
    }

    /// Pick the handler chain, or answer the request directly.
    fn select(&self, req: &Request, res: &mut Response) -> Option<Arc<ResolvedRoute>> {
        if req.cors_host() && !req.cors() {
            tracing::debug!(
                path = %req.path(),
                origin = cors::origin(req.headers()).unwrap_or_default(),
                "Cross-origin request rejected"
            );
            res.error(StatusCode::FORBIDDEN);
            return None;
        }

        let mut method = if req.method() == Method::HEAD {
            Method::GET
        } else {
            req.method().clone()
        };

        if method == Method::OPTIONS && !self.has_specific(&Method::OPTIONS, req.path()) {
            if req.allows_method(&Method::GET) {
                method = Method::GET;
            } else if !req.allow().is_empty() {
                res.send_with((), StatusCode::NO_CONTENT, HeaderMap::new());
                return None;
            }
        }

        if !req.allows_method(&method) {
            let status = if req.allow().is_empty() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::METHOD_NOT_ALLOWED
            };
            res.error(status);
            return None;
        }

        Some(
            self.resolver
                .resolve(&self.registry, req.path(), &MethodKey::Named(method), false),
        )
    }

    /// True if `method` has visible handlers of its own, ignoring wildcard ones.
    fn has_specific(&self, method: &Method, path: &str) -> bool {
        self.resolver
            .resolve(&self.registry, path, &MethodKey::Named(method.clone()), false)
            .specific_visible
            > 0
    }

    async fn run_chain(&self, route: &ResolvedRoute, req: &mut Request, res: &mut Response) {
        let chain = &route.middleware;
        let mut pending: Option<HttpError> = None;
        let mut cursor = 0;

        while cursor < chain.len() {
            let current = &chain[cursor];
            cursor += 1;

            let outcome = match (current, pending.take()) {
                (Handler::Normal(m), None) => {
                    tokio::task::yield_now().await;
                    m.call(req, res).await
                }
                (Handler::Error(m), Some(err)) => {
                    tokio::task::yield_now().await;
                    m.call(err, req, res).await
                }
                (Handler::Normal(_), err @ Some(_)) => {
                    pending = err;
                    continue;
                }
                (Handler::Error(_), None) => continue,
            };

            match outcome {
                Ok(Flow::Next) => {}
                Ok(Flow::Stop) => break,
                Err(err) => pending = Some(err),
            }

            if req.exited() {
                break;
            }
        }

        if let Some(err) = pending {
            let status = err.resolve_status(res.status_code());
            tracing::warn!(
                method = %req.method(),
                path = %req.path(),
                status = status.as_u16(),
                error = %err,
                detail = err.internal_detail().unwrap_or_default(),
                "Unhandled middleware error"
            );
            res.error_with(status, Some(err.body(status)));
        }
    }
}

fn default_headers(config: &RouterConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if !config.silent {
        let ident = format!("woodland/{}", env!("CARGO_PKG_VERSION"));
        if let Ok(value) = HeaderValue::from_str(&ident) {
            headers.insert(header::SERVER, value.clone());
            headers.insert(HeaderName::from_static("x-powered-by"), value);
        }
    }

    for (name, value) in &config.default_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid default header"),
        }
    }

    headers
}
