//! Request handle and per-request context.
//!
//! # Responsibilities
//! - Carry method, URI, headers and peer address from the transport
//! - Hold the context dispatch computes: client IP, CORS decision,
//!   allow string, path parameters
//! - Offer the `exit` capability that ends the middleware chain early
//!
//! The body is passed through untouched; parsing it is left to handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use serde_json::{Map, Value};
use url::Url;

/// An incoming request as seen by the middleware chain.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    body: Option<Body>,
    extensions: Extensions,
    started: Instant,

    url: Option<Url>,
    ip: String,
    cors: bool,
    cors_host: bool,
    allow: Arc<str>,
    params: Map<String, Value>,
    exit: bool,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            peer: None,
            body: None,
            extensions: Extensions::new(),
            started: Instant::now(),
            url: None,
            ip: String::new(),
            cors: false,
            cors_host: false,
            allow: Arc::from(""),
            params: Map::new(),
            exit: false,
        }
    }

    /// Build from a transport request, keeping its body for handlers.
    pub fn from_http(request: axum::http::Request<Body>, peer: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();
        let mut req = Self::new(parts.method, parts.uri);
        req.version = parts.version;
        req.headers = parts.headers;
        req.extensions = parts.extensions;
        req.peer = peer;
        req.body = Some(body);
        req
    }

    /// Add a header; used when building requests by hand.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Raw (still percent-encoded) request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// A header value as text, if present and valid.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Take the request body. Returns `None` once taken.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// When the request entered the router.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// The absolute URL, parsed during decoration.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Client address: first `X-Forwarded-For` entry, else the peer.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// True if the request is cross-origin and its origin is allowed.
    pub fn cors(&self) -> bool {
        self.cors
    }

    /// True if the request is cross-origin at all.
    pub fn cors_host(&self) -> bool {
        self.cors_host
    }

    /// Allow string for this request's path.
    pub fn allow(&self) -> &str {
        &self.allow
    }

    pub fn allows_method(&self, method: &Method) -> bool {
        self.allow.split(", ").any(|m| m == method.as_str())
    }

    /// Path parameters, coerced to JSON values.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// End the middleware chain after the current handler.
    pub fn exit(&mut self) {
        self.exit = true;
    }

    pub fn exited(&self) -> bool {
        self.exit
    }

    pub(crate) fn set_context(&mut self, ip: String, cors_host: bool, cors: bool, allow: Arc<str>) {
        self.url = parse_url(&self.headers, &self.uri);
        self.ip = ip;
        self.cors_host = cors_host;
        self.cors = cors;
        self.allow = allow;
    }

    pub(crate) fn set_params(&mut self, params: Map<String, Value>) {
        self.params = params;
    }
}

/// Client IP from headers and peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_default()
}

fn parse_url(headers: &HeaderMap, uri: &Uri) -> Option<Url> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(&format!("http://{host}{target}")).ok()
}
