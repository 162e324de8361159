//! Per-method middleware storage.
//!
//! # Responsibilities
//! - Validate and normalise method tokens
//! - Store handler chains per method, keyed by the registered pattern
//! - Track which methods have ever been registered
//! - Hold the ignore set used for visibility counts
//!
//! # Design Decisions
//! - Written during setup only; request handling reads it through `&self`
//! - Re-registering a pattern appends handlers and keeps the first
//!   registration's compiled pattern
//! - Entries keep registration order, which is matching order

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use crate::routing::handler::{Handler, HandlerId};
use crate::routing::pattern::{self, CompiledPattern, MATCH_ALL};

/// Method token standing for "every method".
pub const WILDCARD: &str = "*";

/// Method tokens accepted at registration and resolution.
const KNOWN_METHODS: [&str; 9] = [
    "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE",
];

/// Configuration errors raised while building a router.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("HEAD is derived from GET and cannot be registered")]
    HeadRegistration,

    #[error("no handlers supplied for {0}")]
    NoHandlers(String),

    #[error("route pattern must start with '/': {0}")]
    InvalidPattern(String),
}

/// Method key of a middleware table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodKey {
    Any,
    Named(Method),
}

impl MethodKey {
    /// Parse a method token, case-insensitively.
    pub fn parse(token: &str) -> Result<Self, RouterError> {
        let upper = token.trim().to_ascii_uppercase();
        if upper == WILDCARD {
            return Ok(MethodKey::Any);
        }
        if !KNOWN_METHODS.contains(&upper.as_str()) {
            return Err(RouterError::InvalidMethod(token.to_string()));
        }
        Method::from_bytes(upper.as_bytes())
            .map(MethodKey::Named)
            .map_err(|_| RouterError::InvalidMethod(token.to_string()))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, MethodKey::Any)
    }
}

impl From<Method> for MethodKey {
    fn from(method: Method) -> Self {
        MethodKey::Named(method)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKey::Any => f.write_str(WILDCARD),
            MethodKey::Named(m) => f.write_str(m.as_str()),
        }
    }
}

/// Handlers registered under one pattern.
#[derive(Debug, Clone)]
pub struct MiddlewareEntry {
    pub pattern: Arc<CompiledPattern>,
    pub handlers: Vec<Handler>,
}

impl MiddlewareEntry {
    pub fn has_params(&self) -> bool {
        self.pattern.has_params()
    }
}

#[derive(Debug, Default)]
struct MethodTable {
    entries: Vec<MiddlewareEntry>,
    index: HashMap<String, usize>,
}

/// All registered middleware of a router.
#[derive(Debug, Default)]
pub struct MiddlewareRegistry {
    tables: HashMap<MethodKey, MethodTable>,
    methods: Vec<Method>,
    ignored: HashSet<HandlerId>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handlers` under `method` for `pattern` (default: match all).
    pub fn register(
        &mut self,
        method: &str,
        pattern: Option<&str>,
        handlers: Vec<Handler>,
    ) -> Result<(), RouterError> {
        let key = MethodKey::parse(method)?;
        if key == MethodKey::Named(Method::HEAD) {
            return Err(RouterError::HeadRegistration);
        }

        let pattern = pattern.unwrap_or(MATCH_ALL);
        if !pattern.starts_with('/') {
            return Err(RouterError::InvalidPattern(pattern.to_string()));
        }
        if handlers.is_empty() {
            return Err(RouterError::NoHandlers(format!("{key} {pattern}")));
        }

        if let MethodKey::Named(m) = &key {
            if !self.methods.contains(m) {
                self.methods.push(m.clone());
            }
        }

        let table = self.tables.entry(key.clone()).or_default();
        match table.index.get(pattern) {
            Some(&i) => {
                table.entries[i].handlers.extend(handlers);
            }
            None => {
                table.index.insert(pattern.to_string(), table.entries.len());
                table.entries.push(MiddlewareEntry {
                    pattern: Arc::new(pattern::compile(pattern)),
                    handlers,
                });
            }
        }

        tracing::debug!(method = %key, pattern = %pattern, "Middleware registered");
        Ok(())
    }

    /// Entries for `key` in registration order.
    pub fn entries(&self, key: &MethodKey) -> &[MiddlewareEntry] {
        self.tables
            .get(key)
            .map(|t| t.entries.as_slice())
            .unwrap_or_default()
    }

    /// Methods registered so far, in first-registration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Exclude a handler from visibility counts.
    pub fn ignore(&mut self, handler: &Handler) {
        self.ignored.insert(handler.id());
    }

    pub fn is_ignored(&self, handler: &Handler) -> bool {
        self.ignored.contains(&handler.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::handler::{handler, Flow};

    fn noop() -> Handler {
        handler(|_req, _res| Box::pin(async { Ok(Flow::Next) }))
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(MethodKey::parse("get").unwrap(), MethodKey::Named(Method::GET));
        assert_eq!(MethodKey::parse("*").unwrap(), MethodKey::Any);
        assert_eq!(
            MethodKey::parse("FETCH"),
            Err(RouterError::InvalidMethod("FETCH".into()))
        );
    }

    #[test]
    fn test_head_registration_rejected() {
        let mut registry = MiddlewareRegistry::new();
        assert_eq!(
            registry.register("head", Some("/"), vec![noop()]),
            Err(RouterError::HeadRegistration)
        );
        assert!(registry.methods().is_empty());
    }

    #[test]
    fn test_same_pattern_appends() {
        let mut registry = MiddlewareRegistry::new();
        let (a, b, c) = (noop(), noop(), noop());
        registry.register("GET", Some("/x"), vec![a.clone()]).unwrap();
        registry.register("GET", Some("/x"), vec![b.clone(), c.clone()]).unwrap();

        let entries = registry.entries(&MethodKey::Named(Method::GET));
        assert_eq!(entries.len(), 1);
        let ids: Vec<_> = entries[0].handlers.iter().map(Handler::id).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn test_first_registration_keeps_pattern() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("GET", Some("/u/:id"), vec![noop()]).unwrap();
        let first = registry.entries(&MethodKey::Named(Method::GET))[0].pattern.clone();

        registry.register("GET", Some("/u/:id"), vec![noop()]).unwrap();
        let entry = &registry.entries(&MethodKey::Named(Method::GET))[0];
        assert!(Arc::ptr_eq(&first, &entry.pattern));
        assert!(entry.has_params());
    }

    #[test]
    fn test_known_methods_tracking() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("*", None, vec![noop()]).unwrap();
        registry.register("post", Some("/a"), vec![noop()]).unwrap();
        registry.register("GET", Some("/a"), vec![noop()]).unwrap();
        registry.register("POST", Some("/b"), vec![noop()]).unwrap();

        assert_eq!(registry.methods(), [Method::POST, Method::GET]);
        assert_eq!(registry.entries(&MethodKey::Any)[0].pattern.source(), MATCH_ALL);
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        let mut registry = MiddlewareRegistry::new();
        assert!(matches!(
            registry.register("GET", Some("/a"), vec![]),
            Err(RouterError::NoHandlers(_))
        ));
        assert!(matches!(
            registry.register("GET", Some("relative"), vec![noop()]),
            Err(RouterError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_ignore_set() {
        let mut registry = MiddlewareRegistry::new();
        let h = noop();
        assert!(!registry.is_ignored(&h));
        registry.ignore(&h);
        assert!(registry.is_ignored(&h.clone()));
        assert!(!registry.is_ignored(&noop()));
    }
}
