//! Small pure helpers shared by the response and file layers.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Strong ETag for a set of byte slices.
pub fn etag(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    format!("\"{}\"", hex::encode(&digest[..16]))
}

/// ETag for a file from its identity and metadata.
pub fn file_etag(path: &str, size: u64, modified_ms: u128) -> String {
    etag(&[
        path.as_bytes(),
        size.to_string().as_bytes(),
        modified_ms.to_string().as_bytes(),
    ])
}

/// True if an `If-None-Match` header value matches `etag`.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let wanted = etag.trim_start_matches("W/");
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == wanted)
}

/// Escape text for inclusion in HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Coerce a captured path segment into a typed JSON value.
///
/// Numbers, booleans and `null` become their JSON types; everything else
/// stays a string.
pub fn coerce(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if raw.contains(['.', 'e', 'E']) && !raw.starts_with('.') && !raw.ends_with('.') {
        if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    }

    Value::String(raw.to_string())
}
