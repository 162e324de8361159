//! Configuration validation.
//!
//! Semantic checks run after serde has accepted the file. Every failure is
//! collected so a bad config can be fixed in one pass.

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::{RouterConfig, ServerConfig};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("router.cache_size must be at least 1")]
    CacheSize,

    #[error("router.cache_ttl_ms must be at least 1")]
    CacheTtl,

    #[error("router.digit must be at most 9, got {0}")]
    Digit(u32),

    #[error("invalid CORS origin '{0}'")]
    Origin(String),

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("invalid default header '{0}'")]
    Header(String),

    #[error("files.prefix must start with '/', got '{0}'")]
    FilesPrefix(String),
}

/// Validate a full server configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = router_errors(&config.router);

    if !config.files.prefix.starts_with('/') {
        errors.push(ValidationError::FilesPrefix(config.files.prefix.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate router options on their own, for embedders that build
/// `RouterConfig` in code.
pub fn validate_router(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let errors = router_errors(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn router_errors(config: &RouterConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.cache_size == 0 {
        errors.push(ValidationError::CacheSize);
    }
    if config.cache_ttl_ms == 0 {
        errors.push(ValidationError::CacheTtl);
    }
    if config.digit > 9 {
        errors.push(ValidationError::Digit(config.digit));
    }

    for origin in &config.origins {
        let valid = origin == "*"
            || origin.starts_with("http://")
            || origin.starts_with("https://");
        if !valid {
            errors.push(ValidationError::Origin(origin.clone()));
        }
    }

    if !LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(config.logging.level.clone()));
    }

    for (name, value) in &config.default_headers {
        let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
            && HeaderValue::from_str(value).is_ok();
        if !valid {
            errors.push(ValidationError::Header(name.clone()));
        }
    }

    errors
}
