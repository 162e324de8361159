//! Errors raised by handlers.
//!
//! A handler returning `Err(HttpError)` skips forward to the next error
//! handler in its chain. If none remains, the response is closed with a
//! status derived from the error.

use axum::http::StatusCode;
use thiserror::Error;

/// An error raised from inside a middleware chain.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    status: Option<StatusCode>,
    message: String,
    /// Internal detail for logs; never written to a response body.
    detail: Option<String>,
}

impl HttpError {
    /// Create an error from a message.
    ///
    /// A message that is a status code (e.g. `"404"`) selects that status.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            detail: None,
        }
    }

    /// Create an error carrying an explicit status.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            message: status.as_u16().to_string(),
            detail: None,
        }
    }

    /// Attach internal detail for logging.
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn internal_detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Status used when no error handler recovers this error.
    ///
    /// An error status already on the response wins, then the explicit
    /// status, then the message read as a status code, then 500.
    pub fn resolve_status(&self, current: StatusCode) -> StatusCode {
        if is_error_status(current) {
            return current;
        }
        self.status
            .or_else(|| self.message_status())
            .filter(|s| is_error_status(*s))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Text written to the client for `status`.
    pub fn body(&self, status: StatusCode) -> String {
        if self.message.is_empty() || self.message_status().is_some() {
            reason(status).to_string()
        } else {
            self.message.clone()
        }
    }

    fn message_status(&self) -> Option<StatusCode> {
        self.message
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
    }
}

impl From<StatusCode> for HttpError {
    fn from(status: StatusCode) -> Self {
        Self::with_status(status)
    }
}

impl From<std::io::Error> for HttpError {
    fn from(e: std::io::Error) -> Self {
        let status = match e.kind() {
            std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::with_status(status).detail(e.to_string())
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR).detail(e.to_string())
    }
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// Standard reason phrase for a status.
pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}
