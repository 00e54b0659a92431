//! Static file serving handler
//!
//! Resolves request paths under the asset root and applies the fixture
//! server's per-path behaviour: caching, CSP and gzip.

use crate::cache::CacheDecision;
use crate::compress::gzip_async;
use crate::{Request, Response, ResponseBuilder, StatusCode};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// File served for `/`
pub const INDEX: &str = "index.html";

/// Static file configuration
#[derive(Clone, Debug)]
pub struct StaticFileConfig {
    /// Root directory
    pub root: PathBuf,
    /// Reported as `Last-Modified` for cacheable files
    pub start_time: SystemTime,
}

impl StaticFileConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            start_time: SystemTime::now(),
        }
    }

    pub fn start_time(mut self, time: SystemTime) -> Self {
        self.start_time = time;
        self
    }
}

/// Per-request overrides looked up by the caller
#[derive(Debug, Default, Clone, Copy)]
pub struct ServeOptions<'a> {
    /// Cache prefix registered on the server
    pub cache_prefix: Option<&'a str>,
    /// CSP header value for this pathname
    pub csp: Option<&'a str>,
    /// Gzip-encode the body
    pub gzip: bool,
}

/// Static file handler
#[derive(Clone, Debug)]
pub struct StaticFiles {
    config: StaticFileConfig,
}

impl StaticFiles {
    pub fn new(config: StaticFileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StaticFileConfig {
        &self.config
    }

    /// Absolute path a pathname maps to. `None` if it escapes the root.
    pub fn resolve(&self, pathname: &str) -> Option<PathBuf> {
        let pathname = if pathname == "/" {
            INDEX
        } else {
            pathname
        };
        self.sanitize_path(pathname)
            .map(|relative| self.config.root.join(relative))
    }

    /// Build the response for `pathname`
    pub async fn handle(&self, req: &Request, pathname: &str, options: ServeOptions<'_>) -> Response {
        let file_path = match self.resolve(pathname) {
            Some(p) => p,
            None => {
                let unresolved = self.config.root.join(pathname.trim_start_matches('/'));
                return Response::file_not_found(&unresolved);
            }
        };

        let cache = CacheDecision::for_file(
            options.cache_prefix,
            pathname,
            &file_path,
            req.header("if-modified-since"),
            self.config.start_time,
        );
        if cache == CacheDecision::NotModified {
            return Response::not_modified();
        }

        let mut res = Response::new(StatusCode::OK);
        cache.apply(&mut res);
        if let Some(csp) = options.csp {
            res.set_header("Content-Security-Policy", csp);
        }

        let content = match tokio::fs::read(&file_path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(path = %file_path.display(), error = %e, "static file unreadable");
                return Response::file_not_found(&file_path);
            }
        };

        res.set_header("Content-Type", content_type(&file_path));

        if options.gzip {
            match gzip_async(content.into()).await {
                Ok(encoded) => {
                    res.set_header("Content-Encoding", "gzip");
                    res.body = encoded;
                }
                Err(e) => {
                    tracing::error!(path = %file_path.display(), error = %e, "gzip failed");
                    return ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(e.to_string())
                        .build();
                }
            }
        } else {
            res.body = content.into();
        }

        res
    }

    /// Strip the leading slash and refuse traversal out of the root
    fn sanitize_path(&self, path: &str) -> Option<PathBuf> {
        let path = path.trim_start_matches('/');

        let mut result = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(c) => result.push(c),
                Component::ParentDir => return None,
                _ => {}
            }
        }

        Some(result)
    }
}

/// `Content-Type` for a file; textual types carry `charset=utf-8`
pub fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let essence = mime.essence_str();
    if is_textual(essence) {
        format!("{}; charset=utf-8", essence)
    } else {
        essence.to_string()
    }
}

fn is_textual(essence: &str) -> bool {
    essence.starts_with("text/")
        || essence.starts_with("application/javascript")
        || essence.starts_with("application/json")
}
