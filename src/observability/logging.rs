//! Structured logging and access log rendering.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Render access log lines from a log format string
//!
//! # Format tokens
//! - `%h` client ip, `%l` and `%u` always `-`
//! - `%t` `[10/Oct/2000:13:55:36 +0000]`
//! - `%r` request line, `%s` and `%>s` status, `%b` body length or `-`
//! - `%{Name}i` request header, `%{Name}o` response header

use axum::http::{HeaderMap, Method, StatusCode, Version};
use chrono::{DateTime, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target of access log events.
pub const ACCESS_TARGET: &str = "woodland::access";

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("woodland={level},tower_http={level}").into());

    // A second init (tests, embedders) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Everything an access log line can refer to.
pub struct AccessEntry<'a> {
    pub ip: &'a str,
    pub time: DateTime<Utc>,
    pub method: &'a Method,
    pub target: &'a str,
    pub version: Version,
    pub status: StatusCode,
    pub length: Option<u64>,
    pub request_headers: &'a HeaderMap,
    pub response_headers: &'a HeaderMap,
}

impl AccessEntry<'_> {
    /// Render the entry with `format`. Unknown tokens are kept verbatim.
    pub fn render(&self, format: &str) -> String {
        let mut out = String::with_capacity(format.len() + 64);
        let mut rest = format;

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];

            if let Some(tail) = rest.strip_prefix('{') {
                if let Some(close) = tail.find('}') {
                    let name = &tail[..close];
                    let after = &tail[close + 1..];
                    let headers = match after.chars().next() {
                        Some('i') => Some(self.request_headers),
                        Some('o') => Some(self.response_headers),
                        _ => None,
                    };
                    if let Some(headers) = headers {
                        out.push_str(header_or_dash(headers, name));
                        rest = &after[1..];
                        continue;
                    }
                }
                out.push('%');
                continue;
            }

            let (token, consumed) = if rest.starts_with(">s") {
                ('s', 2)
            } else {
                match rest.chars().next() {
                    Some(c) => (c, c.len_utf8()),
                    None => {
                        out.push('%');
                        break;
                    }
                }
            };

            match token {
                'h' => out.push_str(if self.ip.is_empty() { "-" } else { self.ip }),
                'l' | 'u' => out.push('-'),
                't' => out.push_str(&self.time.format("[%d/%b/%Y:%H:%M:%S %z]").to_string()),
                'r' => out.push_str(&format!(
                    "{} {} {}",
                    self.method,
                    self.target,
                    version_str(self.version)
                )),
                's' => out.push_str(self.status.as_str()),
                'b' => match self.length {
                    Some(n) => out.push_str(&n.to_string()),
                    None => out.push('-'),
                },
                '%' => out.push('%'),
                other => {
                    out.push('%');
                    out.push(other);
                }
            }
            rest = &rest[consumed..];
        }

        out.push_str(rest);
        out
    }
}

fn header_or_dash<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
