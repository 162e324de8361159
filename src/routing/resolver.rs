//! Route resolution with caching.
//!
//! # Responsibilities
//! - Collect every handler whose pattern matches a path, wildcard-method
//!   entries first, then method-specific entries
//! - Count visible (non-ignored) handlers for permission decisions
//! - Remember which matched pattern supplies path parameters
//! - Cache results per (method, path), including empty results
//!
//! # Design Decisions
//! - Bounded LRU cache with TTL; registration never invalidates it, since
//!   routes are expected to be registered before traffic starts
//! - Results are shared as `Arc`, so a cache hit is the same object

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::observability::metrics;
use crate::routing::handler::Handler;
use crate::routing::pattern::CompiledPattern;
use crate::routing::registry::{MethodKey, MiddlewareRegistry};

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: MethodKey,
    pub path: String,
}

/// The handler chain matched for one (method, path).
#[derive(Debug, Clone, Default)]
pub struct ResolvedRoute {
    /// Matched handlers, wildcard registrations first.
    pub middleware: Vec<Handler>,
    /// Pattern used for parameter extraction, if any matched pattern has parameters.
    pub params: Option<Arc<CompiledPattern>>,
    /// Number of matched handlers not in the ignore set.
    pub visible: usize,
    /// Visible handlers contributed by the method-specific pass alone.
    pub specific_visible: usize,
    /// First non-ignored handler of the method-specific pass.
    pub last: Option<Handler>,
}

impl ResolvedRoute {
    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

/// Resolves request paths against a registry.
pub struct RouteResolver {
    cache: Cache<RouteKey, Arc<ResolvedRoute>>,
}

impl RouteResolver {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Resolve `path` for `method`, recomputing when `refresh` is set.
    pub fn resolve(
        &self,
        registry: &MiddlewareRegistry,
        path: &str,
        method: &MethodKey,
        refresh: bool,
    ) -> Arc<ResolvedRoute> {
        let key = RouteKey {
            method: method.clone(),
            path: path.to_string(),
        };

        if !refresh {
            if let Some(hit) = self.cache.get(&key) {
                return hit;
            }
        }

        metrics::record_route_cache_miss();
        let resolved = Arc::new(compute(registry, path, method));
        tracing::trace!(
            method = %method,
            path = %path,
            handler_count = resolved.middleware.len(),
            visible = resolved.visible,
            "Route resolved"
        );
        self.cache.insert(key, Arc::clone(&resolved));
        resolved
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

fn compute(registry: &MiddlewareRegistry, path: &str, method: &MethodKey) -> ResolvedRoute {
    let mut result = ResolvedRoute::default();

    for entry in registry.entries(&MethodKey::Any) {
        if !entry.pattern.is_match(path) {
            continue;
        }
        if entry.has_params() && result.params.is_none() {
            result.params = Some(Arc::clone(&entry.pattern));
        }
        result.middleware.extend(entry.handlers.iter().cloned());
    }

    if !method.is_wildcard() {
        for entry in registry.entries(method) {
            if !entry.pattern.is_match(path) {
                continue;
            }
            if entry.has_params() && result.params.is_none() {
                result.params = Some(Arc::clone(&entry.pattern));
            }
            for handler in &entry.handlers {
                if !registry.is_ignored(handler) {
                    result.specific_visible += 1;
                    if result.last.is_none() {
                        result.last = Some(handler.clone());
                    }
                }
                result.middleware.push(handler.clone());
            }
        }
    }

    result.visible = result
        .middleware
        .iter()
        .filter(|h| !registry.is_ignored(h))
        .count();

    result
}
