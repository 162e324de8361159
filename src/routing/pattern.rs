//! Route pattern compilation.
//!
//! # Responsibilities
//! - Rewrite each `/:name` segment into a named single-segment capture
//! - Anchor the result for exact full-path matching
//! - Pass hand-written expressions (anything containing `(`) through as-is
//!
//! # Design Decisions
//! - Literal segments are not escaped, so `/.*` stays a catch-all
//! - Compilation never fails loudly: an invalid expression yields a
//!   pattern that matches nothing

use regex::Regex;

/// Pattern used when a registration omits one.
pub const MATCH_ALL: &str = "/.*";

/// A route pattern ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    expression: String,
    matcher: Option<Regex>,
    params: Vec<String>,
}

impl CompiledPattern {
    /// The pattern string as registered.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The anchored regular expression the pattern compiled to.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Parameter names in left-to-right order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    /// Returns true if `path` matches the whole pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(path))
    }

    /// Extract `(name, raw value)` pairs for every declared parameter.
    ///
    /// Returns an empty list when the path does not match.
    pub fn captures(&self, path: &str) -> Vec<(String, String)> {
        let Some(caps) = self.matcher.as_ref().and_then(|m| m.captures(path)) else {
            return Vec::new();
        };

        self.params
            .iter()
            .filter_map(|name| {
                caps.name(name)
                    .map(|value| (name.clone(), value.as_str().to_string()))
            })
            .collect()
    }
}

/// Rewrite `pattern` into its unanchored expression plus parameter names.
///
/// Patterns containing `(` are returned untouched with no parameters.
pub fn expression(pattern: &str) -> (String, Vec<String>) {
    if pattern.contains('(') {
        return (pattern.to_string(), Vec::new());
    }

    let mut params = Vec::new();
    let segments: Vec<String> = pattern
        .split('/')
        .map(|segment| {
            let Some(rest) = segment.strip_prefix(':') else {
                return segment.to_string();
            };
            let name_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if name_len == 0 {
                return segment.to_string();
            }
            let (name, tail) = rest.split_at(name_len);
            params.push(name.to_string());
            format!("(?P<{name}>[^/]+){tail}")
        })
        .collect();

    (segments.join("/"), params)
}

/// Compile a route pattern.
pub fn compile(pattern: &str) -> CompiledPattern {
    let (body, params) = expression(pattern);
    let expression = format!("^{body}$");

    let matcher = match Regex::new(&expression) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Route pattern will never match");
            None
        }
    };

    let params = if matcher.is_some() { params } else { Vec::new() };

    CompiledPattern {
        source: pattern.to_string(),
        expression,
        matcher,
        params,
    }
}
