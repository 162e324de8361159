//! Static file serving.
//!
//! # Responsibilities
//! - Map a request path under a mount prefix onto a file below the root
//! - Reject traversal (`..` segments, control characters, symlinks leaving
//!   the root) with 403; missing files are 404, never 500
//! - Serve directories through index files, redirects and listings
//! - Stream files with conditional GET and single byte ranges
//!
//! # Design Decisions
//! - File-system error detail goes to the log only
//! - Failures are returned as `HttpError` so application error handlers
//!   later in the chain can still take over

pub mod autoindex;
pub mod mime;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, Method, StatusCode};
use chrono::{DateTime, Utc};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::RouterConfig;
use crate::http::{range, Body, HttpError, Request, Response};
use crate::routing::handler::{Flow, Outcome};
use crate::util;

const OPTIONS_BODY: &str = "Make a GET request to retrieve the file";

/// Metadata of a file about to be streamed.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileInfo {
    pub fn new(path: PathBuf, meta: &std::fs::Metadata) -> Self {
        Self {
            path,
            size: meta.len(),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
        }
    }

    fn modified_ms(&self) -> u128 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }

    fn modified_secs(&self) -> i64 {
        i64::try_from(self.modified_ms() / 1000).unwrap_or(i64::MAX)
    }

    /// HTTP date of the modification time.
    pub fn last_modified(&self) -> String {
        DateTime::<Utc>::from(self.modified)
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }

    pub fn etag(&self) -> String {
        util::file_etag(&self.path.to_string_lossy(), self.size, self.modified_ms())
    }
}

/// A directory mounted under a URL prefix.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    prefix: String,
    root: PathBuf,
    indexes: Vec<String>,
    autoindex: bool,
    etags: bool,
}

impl StaticFiles {
    /// `prefix` has no trailing slash; the empty string mounts at `/`.
    pub fn new(prefix: &str, root: PathBuf, config: &RouterConfig) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            root,
            indexes: config.indexes.clone(),
            autoindex: config.autoindex,
            etags: config.etags,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve the file or directory `req` points at.
    pub async fn serve(&self, req: &mut Request, res: &mut Response) -> Outcome {
        let path = req.path().to_string();
        let relative = match path.strip_prefix(&self.prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => return Err(not_found("outside mount")),
        };

        let decoded = urlencoding::decode(relative).map_err(|_| not_found("malformed path"))?;
        if decoded.chars().any(char::is_control) || decoded.split('/').any(|s| s == "..") {
            tracing::warn!(path = %path, ip = %req.ip(), "Rejected traversal attempt");
            return Err(HttpError::with_status(StatusCode::FORBIDDEN));
        }

        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| not_found(e.to_string()))?;
        let mut target = root.clone();
        for segment in decoded.split('/').filter(|s| !s.is_empty() && *s != ".") {
            target.push(segment);
        }

        let target = fs::canonicalize(&target)
            .await
            .map_err(|e| not_found(e.to_string()))?;
        if !target.starts_with(&root) {
            tracing::warn!(path = %path, "Rejected path resolving outside root");
            return Err(HttpError::with_status(StatusCode::FORBIDDEN));
        }

        let meta = fs::metadata(&target)
            .await
            .map_err(|e| not_found(e.to_string()))?;

        if !meta.is_dir() {
            return self.stream(req, res, &FileInfo::new(target, &meta)).await;
        }

        if !path.ends_with('/') {
            let location = match req.query() {
                Some(query) => format!("{path}/?{query}"),
                None => format!("{path}/"),
            };
            res.redirect(&location, false);
            return Ok(Flow::Stop);
        }

        for index in &self.indexes {
            let candidate = target.join(index);
            if let Ok(meta) = fs::metadata(&candidate).await {
                if meta.is_file() {
                    return self.stream(req, res, &FileInfo::new(candidate, &meta)).await;
                }
            }
        }

        if !self.autoindex {
            return Err(not_found("no index file"));
        }

        let entries = autoindex::entries(&target)
            .await
            .map_err(|e| not_found(e.to_string()))?;
        let html = autoindex::render(&path, &entries, target != root);
        let content_type = format!("text/html; charset={}", res.charset());
        res.header(header::CONTENT_TYPE, &content_type);
        res.send(html);
        Ok(Flow::Stop)
    }

    /// Write `file` to `res`, honoring conditional and range headers.
    pub async fn stream(&self, req: &mut Request, res: &mut Response, file: &FileInfo) -> Outcome {
        let content_type = mime::content_type(&file.path, res.charset());
        res.header(header::CONTENT_LENGTH, &file.size.to_string())
            .header(header::CONTENT_TYPE, &content_type)
            .header(header::LAST_MODIFIED, &file.last_modified());

        let etag = self.etags.then(|| file.etag());
        if let Some(etag) = &etag {
            res.header(header::ETAG, etag);
            let conflicting = res
                .headers()
                .get(header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("no-cache") || v.contains("no-store"));
            if conflicting {
                res.headers_mut().remove(header::CACHE_CONTROL);
            }
        }

        let method = req.method().clone();
        if method == Method::GET {
            if not_modified(req, etag.as_deref(), file) {
                res.headers_mut().remove(header::CONTENT_LENGTH);
                res.headers_mut().remove(header::CONTENT_TYPE);
                res.send_with((), StatusCode::NOT_MODIFIED, HeaderMap::new());
                return Ok(Flow::Stop);
            }

            let mut handle = File::open(&file.path)
                .await
                .map_err(|e| not_found(e.to_string()))?;

            if let Some(requested) = res.take_range() {
                match range::parse(&requested, file.size) {
                    Ok(Some(r)) => {
                        handle.seek(SeekFrom::Start(r.start)).await?;
                        res.header(header::CONTENT_RANGE, &r.content_range(file.size))
                            .header(header::CONTENT_LENGTH, &r.length().to_string());
                        res.send_with(
                            Body::reader(handle.take(r.length())),
                            StatusCode::PARTIAL_CONTENT,
                            HeaderMap::new(),
                        );
                        return Ok(Flow::Stop);
                    }
                    Ok(None) => {}
                    Err(_) => {
                        res.reject_range(file.size);
                        return Ok(Flow::Stop);
                    }
                }
            }

            res.send(Body::reader(handle));
        } else if method == Method::HEAD {
            res.send(Body::Empty);
        } else if method == Method::OPTIONS {
            res.headers_mut().remove(header::CONTENT_LENGTH);
            res.headers_mut().remove(header::LAST_MODIFIED);
            res.headers_mut().remove(header::ETAG);
            let content_type = format!("text/plain; charset={}", res.charset());
            res.header(header::CONTENT_TYPE, &content_type);
            res.send(OPTIONS_BODY);
        } else {
            return Err(HttpError::with_status(StatusCode::METHOD_NOT_ALLOWED));
        }

        Ok(Flow::Stop)
    }
}

fn not_modified(req: &Request, etag: Option<&str>, file: &FileInfo) -> bool {
    if let (Some(wanted), Some(etag)) = (req.header(header::IF_NONE_MATCH), etag) {
        return util::etag_matches(wanted, etag);
    }
    req.header(header::IF_MODIFIED_SINCE)
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .is_some_and(|since| since.timestamp() >= file.modified_secs())
}

fn not_found(detail: impl Into<String>) -> HttpError {
    HttpError::with_status(StatusCode::NOT_FOUND).detail(detail)
}
