//! Cross-origin request classification.

use axum::http::{header, HeaderMap};

/// The request's `Origin` header, if any.
pub fn origin(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// True when the `Origin` host differs from the `Host` header.
pub fn is_cross_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = origin(headers) else {
        return false;
    };
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    strip_scheme(origin) != host
}

/// True when `origin` is in the allow-list, or the list holds `*`.
pub fn is_allowed(origins: &[String], origin: &str) -> bool {
    origins.iter().any(|o| o == "*" || o == origin)
}

fn strip_scheme(origin: &str) -> &str {
    origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin)
}
