//! Response handle and its decorators.
//!
//! # Responsibilities
//! - `send`/`json`/`redirect`/`error`/`status` helpers for handlers
//! - Byte-range slicing and validation on the terminal write
//! - ETag based conditional GET for buffered bodies
//! - Before-send hooks (response time, application hook)
//!
//! # Design Decisions
//! - The first terminal write wins; later writes are logged no-ops, which is
//!   what makes handlers after a write harmless
//! - Error bodies are reason phrases or explicit messages, never internals

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::events::{EventSender, RouterEvent};
use crate::http::error::reason;
use crate::http::range;
use crate::util;

/// Hook run immediately before every terminal write.
pub type OnSend = Arc<dyn Fn(&mut Response) + Send + Sync>;

/// Header carrying the elapsed handling time.
pub const X_RESPONSE_TIME: &str = "x-response-time";

/// Response payload.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl Body {
    /// Wrap an async reader to be streamed to the client.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Body::Stream(Box::pin(reader))
    }

    /// Buffered bytes, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Empty => Some(&[]),
            Body::Full(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Full(Bytes::from(v))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Full(b)
    }
}

/// Request facts the decorators need, attached during decoration.
#[derive(Clone, Default)]
pub(crate) struct ResponseContext {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) range: Option<String>,
    pub(crate) if_none_match: Option<String>,
    pub(crate) cors: bool,
    pub(crate) etags: bool,
    pub(crate) time: bool,
    pub(crate) digit: u32,
    pub(crate) charset: String,
    pub(crate) started: Option<Instant>,
    pub(crate) on_send: Option<OnSend>,
    pub(crate) events: Option<EventSender>,
}

/// The response a middleware chain writes to.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    sent: bool,
    ctx: ResponseContext,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("sent", &self.sent)
            .finish()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Body::Empty,
            sent: false,
            ctx: ResponseContext::default(),
        }
    }

    /// Set the status used by the next `send`.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header from text. Invalid values are dropped with a warning.
    pub fn header(&mut self, name: HeaderName, value: &str) -> &mut Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
        }
        self
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// True once a terminal write happened.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Send `body` with the pending status.
    pub fn send(&mut self, body: impl Into<Body>) {
        let status = self.status;
        self.send_with(body, status, HeaderMap::new());
    }

    /// Send `body` with an explicit status and extra headers.
    pub fn send_with(&mut self, body: impl Into<Body>, status: StatusCode, headers: HeaderMap) {
        if self.sent {
            tracing::debug!(path = %self.ctx.path, "Response already sent");
            return;
        }

        self.status = status;
        self.headers.extend(headers);
        self.before_send();

        match body.into() {
            Body::Stream(stream) if self.ctx.method != Method::HEAD => {
                if let (Some(requested), Some(size)) = (self.ctx.range.clone(), self.content_length()) {
                    if range::parse(&requested, size).is_err() {
                        self.reject_range(size);
                        return;
                    }
                }
                self.finish(Body::Stream(stream));
            }
            Body::Stream(_) | Body::Empty => self.send_buffered(Bytes::new()),
            Body::Full(bytes) => self.send_buffered(bytes),
        }
    }

    /// Serialize `value` as JSON and send it with the pending status.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        let status = self.status;
        self.json_with(value, status, HeaderMap::new());
    }

    pub fn json_with<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        status: StatusCode,
        mut headers: HeaderMap,
    ) {
        match serde_json::to_vec(value) {
            Ok(encoded) => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json; charset=utf-8"),
                );
                self.send_with(encoded, status, headers);
            }
            Err(e) => {
                tracing::warn!(path = %self.ctx.path, error = %e, "JSON serialization failed");
                self.error(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Redirect with 308 (permanent) or 307 (temporary).
    pub fn redirect(&mut self, location: &str, permanent: bool) {
        let status = if permanent {
            StatusCode::PERMANENT_REDIRECT
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };

        match HeaderValue::from_str(location) {
            Ok(value) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::LOCATION, value);
                self.send_with(Body::Empty, status, headers);
            }
            Err(_) => {
                tracing::warn!(location = %location, "Invalid redirect location");
                self.error(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Close the response with an error status and its reason phrase.
    pub fn error(&mut self, status: StatusCode) {
        self.error_with(status, None);
    }

    /// Close the response with an error status and optional message.
    ///
    /// An error status already pending on the response takes precedence.
    pub fn error_with(&mut self, status: StatusCode, message: Option<String>) {
        if self.sent {
            return;
        }

        let status = if self.status.is_client_error() || self.status.is_server_error() {
            self.status
        } else {
            status
        };

        self.headers.remove(header::CONTENT_LENGTH);
        if status == StatusCode::NOT_FOUND {
            self.headers.insert(header::ALLOW, HeaderValue::from_static(""));
            if self.ctx.cors {
                self.headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(""),
                );
            }
        }

        let message = message.unwrap_or_else(|| reason(status).to_string());
        tracing::debug!(
            method = %self.ctx.method,
            path = %self.ctx.path,
            status = status.as_u16(),
            "Responding with error"
        );

        if let Some(events) = &self.ctx.events {
            events.emit(RouterEvent::Error {
                method: self.ctx.method.clone(),
                path: self.ctx.path.clone(),
                status,
                message: message.clone(),
            });
        }

        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.send_with(message, status, HeaderMap::new());
    }

    /// Convert into a transport response.
    pub fn into_http(self) -> axum::response::Response {
        let body = match self.body {
            Body::Empty => axum::body::Body::empty(),
            Body::Full(bytes) => axum::body::Body::from(bytes),
            Body::Stream(reader) => axum::body::Body::from_stream(ReaderStream::new(reader)),
        };

        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    pub(crate) fn attach(&mut self, ctx: ResponseContext) {
        self.ctx = ctx;
    }

    pub(crate) fn method(&self) -> &Method {
        &self.ctx.method
    }

    pub(crate) fn charset(&self) -> &str {
        if self.ctx.charset.is_empty() {
            "utf-8"
        } else {
            &self.ctx.charset
        }
    }

    /// Take the pending `Range` header, marking it handled.
    pub(crate) fn take_range(&mut self) -> Option<String> {
        self.ctx.range.take()
    }

    /// Answer 416 for a representation of `size` bytes.
    pub(crate) fn reject_range(&mut self, size: u64) {
        if let Ok(value) = HeaderValue::from_str(&range::unsatisfied_range(size)) {
            self.headers.insert(header::CONTENT_RANGE, value);
        }
        self.error(StatusCode::RANGE_NOT_SATISFIABLE);
    }

    fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    fn before_send(&mut self) {
        if self.ctx.time {
            if let Some(started) = self.ctx.started {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                let value = format!("{:.*} ms", self.ctx.digit as usize, elapsed);
                self.header(HeaderName::from_static(X_RESPONSE_TIME), &value);
            }
        }
        if let Some(hook) = self.ctx.on_send.clone() {
            hook(self);
        }
    }

    fn send_buffered(&mut self, mut bytes: Bytes) {
        let head = self.ctx.method == Method::HEAD;
        let cacheable =
            self.status == StatusCode::OK && (head || self.ctx.method == Method::GET);

        if cacheable && self.ctx.etags && !self.headers.contains_key(header::ETAG) {
            let tag = buffered_etag(&self.ctx.method, &bytes);
            if let Ok(value) = HeaderValue::from_str(&tag) {
                self.headers.insert(header::ETAG, value);
            }
        }

        if cacheable {
            let current = self
                .headers
                .get(header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let (Some(wanted), Some(tag)) = (self.ctx.if_none_match.as_deref(), current) {
                if util::etag_matches(wanted, &tag) {
                    self.status = StatusCode::NOT_MODIFIED;
                    self.headers.remove(header::CONTENT_LENGTH);
                    self.headers.remove(header::CONTENT_TYPE);
                    self.finish(Body::Empty);
                    return;
                }
            }
        }

        if self.status == StatusCode::OK && !bytes.is_empty() {
            if let Some(requested) = self.ctx.range.take() {
                let size = bytes.len() as u64;
                match range::parse(&requested, size) {
                    Ok(Some(r)) => {
                        self.status = StatusCode::PARTIAL_CONTENT;
                        self.header(header::CONTENT_RANGE, &r.content_range(size));
                        bytes = bytes.slice(r.start as usize..=r.end as usize);
                    }
                    Ok(None) => {}
                    Err(_) => {
                        self.reject_range(size);
                        return;
                    }
                }
            }
        }

        if matches!(self.status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED) {
            self.headers.remove(header::CONTENT_LENGTH);
            self.finish(Body::Empty);
            return;
        }

        if !bytes.is_empty() && !self.headers.contains_key(header::CONTENT_TYPE) {
            let content_type = format!("text/plain; charset={}", self.charset());
            self.header(header::CONTENT_TYPE, &content_type);
        }
        if !(head && self.headers.contains_key(header::CONTENT_LENGTH)) {
            self.headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }

        self.finish(if head { Body::Empty } else { Body::Full(bytes) });
    }

    fn finish(&mut self, body: Body) {
        self.body = body;
        self.sent = true;
    }
}

/// Strong tag over method and body. HEAD is hashed as GET so both agree.
fn buffered_etag(method: &Method, body: &[u8]) -> String {
    let method = if method == Method::HEAD { &Method::GET } else { method };
    util::etag(&[method.as_str().as_bytes(), body])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_ctx(ctx: ResponseContext) -> Response {
        let mut res = Response::new();
        res.attach(ctx);
        res
    }

    fn get_ctx() -> ResponseContext {
        ResponseContext {
            method: Method::GET,
            path: "/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_send_wins() {
        let mut res = with_ctx(get_ctx());
        res.send("first");
        res.send("second");
        assert!(res.is_sent());
        assert_eq!(res.body().as_bytes(), Some(&b"first"[..]));
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "5");
    }

    #[test]
    fn test_json_sets_content_type() {
        let mut res = with_ctx(get_ctx());
        res.json(&serde_json::json!({"ok": true}));
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json; charset=utf-8");
        assert_eq!(res.body().as_bytes(), Some(&br#"{"ok":true}"#[..]));
    }

    #[test]
    fn test_redirect_codes() {
        let mut temporary = with_ctx(get_ctx());
        temporary.redirect("/elsewhere", false);
        assert_eq!(temporary.status_code(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(temporary.headers()[header::LOCATION], "/elsewhere");

        let mut permanent = with_ctx(get_ctx());
        permanent.redirect("/moved", true);
        assert_eq!(permanent.status_code(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(permanent.body().as_bytes(), Some(&b""[..]));
    }

    #[test]
    fn test_error_prefers_pending_error_status() {
        let mut res = with_ctx(get_ctx());
        res.status(StatusCode::UNAUTHORIZED);
        res.error(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body().as_bytes(), Some(&b"Unauthorized"[..]));
    }

    #[test]
    fn test_not_found_blanks_allow() {
        let mut res = with_ctx(ResponseContext {
            cors: true,
            ..get_ctx()
        });
        res.header(header::ALLOW, "GET, HEAD, OPTIONS");
        res.error(StatusCode::NOT_FOUND);
        assert_eq!(res.headers()[header::ALLOW], "");
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "");
        assert_eq!(res.body().as_bytes(), Some(&b"Not Found"[..]));
    }

    #[test]
    fn test_error_after_send_is_noop() {
        let mut res = with_ctx(get_ctx());
        res.send("done");
        res.error(StatusCode::BAD_GATEWAY);
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[test]
    fn test_buffered_range() {
        let mut res = with_ctx(ResponseContext {
            range: Some("bytes=0-4".into()),
            ..get_ctx()
        });
        res.send("Hello, World!");
        assert_eq!(res.status_code(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 0-4/13");
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(res.body().as_bytes(), Some(&b"Hello"[..]));
    }

    #[test]
    fn test_buffered_range_unsatisfiable() {
        let mut res = with_ctx(ResponseContext {
            range: Some("bytes=500000-".into()),
            ..get_ctx()
        });
        res.send("Hello, World!");
        assert_eq!(res.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes */13");
    }

    #[test]
    fn test_etag_conditional_get() {
        let tag = util::etag(&[b"GET", b"cached body"]);
        let mut res = with_ctx(ResponseContext {
            etags: true,
            if_none_match: Some(tag.clone()),
            ..get_ctx()
        });
        res.send("cached body");
        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert_eq!(res.headers()[header::ETAG], tag.as_str());
        assert!(res.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(res.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(res.body().as_bytes(), Some(&b""[..]));
    }

    #[test]
    fn test_etag_covers_method_and_body() {
        let get = buffered_etag(&Method::GET, b"payload");
        assert_eq!(get, util::etag(&[b"GET", b"payload"]));
        assert_ne!(get, util::etag(&[b"payload"]));
        assert_eq!(buffered_etag(&Method::HEAD, b"payload"), get);
        assert_ne!(buffered_etag(&Method::POST, b"payload"), get);
    }

    #[test]
    fn test_head_keeps_length_drops_body() {
        let mut res = with_ctx(ResponseContext {
            method: Method::HEAD,
            ..get_ctx()
        });
        res.send("twelve bytes");
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "12");
        assert_eq!(res.body().as_bytes(), Some(&b""[..]));
    }

    #[test]
    fn test_on_send_hook_and_time_header() {
        let hook: OnSend = Arc::new(|res: &mut Response| {
            res.header(HeaderName::from_static("x-hooked"), "yes");
        });
        let mut res = with_ctx(ResponseContext {
            time: true,
            digit: 2,
            started: Some(Instant::now()),
            on_send: Some(hook),
            ..get_ctx()
        });
        res.send("x");
        assert_eq!(res.headers()["x-hooked"], "yes");
        let timing = res.headers()[X_RESPONSE_TIME].to_str().unwrap();
        assert!(timing.ends_with(" ms"));
        assert_eq!(timing.split('.').nth(1).map(|d| d.len()), Some(5));
    }

    #[test]
    fn test_stream_with_bad_range_rejected() {
        let mut res = with_ctx(ResponseContext {
            range: Some("bytes=99-".into()),
            ..get_ctx()
        });
        res.header(header::CONTENT_LENGTH, "10");
        res.send(Body::reader(&b"0123456789"[..]));
        assert_eq!(res.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(!res.body().is_stream());
    }
}
