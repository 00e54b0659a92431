//! HTTP caching headers for static responses
//!
//! Files under the cache prefix are served as immutable, with the server's
//! start time as `Last-Modified`; everything else is marked uncacheable.

use crate::Response;
use std::path::Path;
use std::time::SystemTime;

/// `Cache-Control` for files under the cache prefix
pub const CACHEABLE: &str = "public, max-age=31536000";

/// `Cache-Control` for everything else
pub const UNCACHEABLE: &str = "no-cache, no-store";

/// Outcome of the cache check for one static response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Conditional request for a cached file: answer with a bare 304
    NotModified,
    /// Serve with long-lived caching headers
    Cacheable { last_modified: String },
    /// Serve with caching disabled
    Uncacheable,
}

impl CacheDecision {
    /// Decide how to cache a static file.
    ///
    /// `prefix` matches against either the request pathname or the
    /// resolved file path.
    pub fn for_file(
        prefix: Option<&str>,
        pathname: &str,
        file_path: &Path,
        if_modified_since: Option<&str>,
        start_time: SystemTime,
    ) -> Self {
        let cached = prefix
            .map(|p| pathname.starts_with(p) || file_path.to_string_lossy().starts_with(p))
            .unwrap_or(false);

        if !cached {
            return CacheDecision::Uncacheable;
        }

        if if_modified_since.is_some() {
            return CacheDecision::NotModified;
        }

        CacheDecision::Cacheable {
            last_modified: httpdate::fmt_http_date(start_time),
        }
    }

    /// Add the caching headers for this decision
    pub fn apply(&self, res: &mut Response) {
        match self {
            CacheDecision::NotModified => {}
            CacheDecision::Cacheable { last_modified } => {
                res.set_header("Cache-Control", CACHEABLE);
                res.set_header("Last-Modified", last_modified.as_str());
            }
            CacheDecision::Uncacheable => {
                res.set_header("Cache-Control", UNCACHEABLE);
            }
        }
    }
}
