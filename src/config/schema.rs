//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so partial files are valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Common log format.
pub const DEFAULT_LOG_FORMAT: &str = "%h %l %u %t \"%r\" %>s %b";

/// Per-router options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Serve directory listings when no index file exists.
    pub autoindex: bool,

    /// Maximum entries in the route and permission caches.
    pub cache_size: u64,

    /// Cache entry lifetime in milliseconds.
    pub cache_ttl_ms: u64,

    /// Charset appended to text content types.
    pub charset: String,

    /// Headers merged into every response.
    pub default_headers: BTreeMap<String, String>,

    /// Decimal places of the response-time header.
    pub digit: u32,

    /// Enable ETag generation and conditional GET.
    pub etags: bool,

    /// Index file names, tried in order.
    pub indexes: Vec<String>,

    /// Allowed CORS origins (`*` allows any).
    pub origins: Vec<String>,

    /// Suppress the identifying `Server`/`X-Powered-By` headers.
    pub silent: bool,

    /// Attach an `X-Response-Time` header.
    pub time: bool,

    /// Access log settings.
    pub logging: LoggingConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            autoindex: false,
            cache_size: 1000,
            cache_ttl_ms: 10_000,
            charset: "utf-8".to_string(),
            default_headers: BTreeMap::new(),
            digit: 3,
            etags: true,
            indexes: vec!["index.htm".to_string(), "index.html".to_string()],
            origins: Vec::new(),
            silent: false,
            time: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit an access log line per response.
    pub enabled: bool,

    /// Line format (`%h %l %u %t "%r" %>s %b` tokens).
    pub format: String,

    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: DEFAULT_LOG_FORMAT.to_string(),
            level: "info".to_string(),
        }
    }
}

/// Root configuration of the `woodland` binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Router options.
    pub router: RouterConfig,

    /// Static file mount.
    pub files: FilesConfig,

    /// Metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Static file mount configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Mount the directory at all.
    pub enabled: bool,

    /// URL prefix the files are served under.
    pub prefix: String,

    /// Directory to serve.
    pub root: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "/".to_string(),
            root: ".".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
