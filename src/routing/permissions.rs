//! Allowed-method computation.
//!
//! # Responsibilities
//! - Decide whether a method has visible handlers for a path
//! - Build the `Allow` string for a path, cached per path
//!
//! # Allow string rules
//! - A visible wildcard-method handler allows every registered method
//! - Otherwise each registered method is resolved in turn
//! - A non-empty set always gains OPTIONS; a set with GET gains HEAD
//! - Methods are sorted and joined with `", "`; empty means not found

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use moka::sync::Cache;

use crate::routing::registry::{MethodKey, MiddlewareRegistry};
use crate::routing::resolver::RouteResolver;

/// Computes and caches allowed methods per path.
pub struct PermissionResolver {
    cache: Cache<String, Arc<str>>,
}

impl PermissionResolver {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// True if `method` has at least one visible handler for `path`.
    pub fn allowed(
        &self,
        registry: &MiddlewareRegistry,
        routes: &RouteResolver,
        method: &MethodKey,
        path: &str,
        refresh: bool,
    ) -> bool {
        routes.resolve(registry, path, method, refresh).visible > 0
    }

    /// The `Allow` string for `path`.
    pub fn allows(
        &self,
        registry: &MiddlewareRegistry,
        routes: &RouteResolver,
        path: &str,
        refresh: bool,
    ) -> Arc<str> {
        if !refresh {
            if let Some(hit) = self.cache.get(path) {
                return hit;
            }
        }

        let mut methods: Vec<Method> =
            if self.allowed(registry, routes, &MethodKey::Any, path, refresh) {
                registry.methods().to_vec()
            } else {
                registry
                    .methods()
                    .iter()
                    .filter(|m| {
                        self.allowed(registry, routes, &MethodKey::Named((*m).clone()), path, refresh)
                    })
                    .cloned()
                    .collect()
            };

        if !methods.is_empty() {
            if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
                methods.push(Method::HEAD);
            }
            if !methods.contains(&Method::OPTIONS) {
                methods.push(Method::OPTIONS);
            }
        }

        let mut names: Vec<&str> = methods.iter().map(Method::as_str).collect();
        names.sort_unstable();
        names.dedup();

        let allow: Arc<str> = Arc::from(names.join(", "));
        self.cache.insert(path.to_string(), Arc::clone(&allow));
        allow
    }

    /// Drop every cached allow string.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::handler::{handler, Flow, Handler};

    fn noop() -> Handler {
        handler(|_req, _res| Box::pin(async { Ok(Flow::Next) }))
    }

    fn setup() -> (MiddlewareRegistry, RouteResolver, PermissionResolver) {
        let ttl = Duration::from_secs(60);
        (
            MiddlewareRegistry::new(),
            RouteResolver::new(100, ttl),
            PermissionResolver::new(100, ttl),
        )
    }

    #[test]
    fn test_get_implies_head_and_options() {
        let (mut registry, routes, perms) = setup();
        registry.register("GET", Some("/x"), vec![noop()]).unwrap();
        assert_eq!(&*perms.allows(&registry, &routes, "/x", false), "GET, HEAD, OPTIONS");
    }

    #[test]
    fn test_post_only() {
        let (mut registry, routes, perms) = setup();
        registry.register("POST", Some("/x"), vec![noop()]).unwrap();
        let allow = perms.allows(&registry, &routes, "/x", false);
        assert_eq!(&*allow, "OPTIONS, POST");
        assert!(!allow.contains("HEAD"));
    }

    #[test]
    fn test_unknown_path_is_empty() {
        let (mut registry, routes, perms) = setup();
        registry.register("GET", Some("/x"), vec![noop()]).unwrap();
        assert_eq!(&*perms.allows(&registry, &routes, "/y", false), "");
    }

    #[test]
    fn test_wildcard_fast_path_allows_all_known() {
        let (mut registry, routes, perms) = setup();
        registry.register("PUT", Some("/other"), vec![noop()]).unwrap();
        registry.register("DELETE", Some("/other"), vec![noop()]).unwrap();
        registry.register("*", Some("/open"), vec![noop()]).unwrap();
        assert_eq!(
            &*perms.allows(&registry, &routes, "/open", false),
            "DELETE, OPTIONS, PUT"
        );
    }

    #[test]
    fn test_ignored_handlers_do_not_grant_methods() {
        let (mut registry, routes, perms) = setup();
        let infra = noop();
        registry.register("GET", None, vec![infra.clone()]).unwrap();
        registry.register("POST", Some("/form"), vec![noop()]).unwrap();
        registry.ignore(&infra);

        assert_eq!(&*perms.allows(&registry, &routes, "/form", false), "OPTIONS, POST");
        assert!(!perms.allowed(
            &registry,
            &routes,
            &MethodKey::Named(Method::GET),
            "/form",
            false
        ));
    }

    #[test]
    fn test_allow_string_is_cached() {
        let (mut registry, routes, perms) = setup();
        registry.register("GET", Some("/x"), vec![noop()]).unwrap();
        let first = perms.allows(&registry, &routes, "/x", false);

        registry.register("PATCH", Some("/x"), vec![noop()]).unwrap();
        let cached = perms.allows(&registry, &routes, "/x", false);
        assert!(Arc::ptr_eq(&first, &cached));

        let refreshed = perms.allows(&registry, &routes, "/x", true);
        assert_eq!(&*refreshed, "GET, HEAD, OPTIONS, PATCH");
    }
}
