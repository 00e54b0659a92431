//! HTTP Request types

use crate::deferred::{deferred, Promise};
use bytes::Bytes;
use http::Method;
use http_body_util::BodyExt;
use smallvec::SmallVec;

/// Failure while buffering a request body
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to read request body: {message}")]
pub struct BodyError {
    pub message: String,
    /// The peer went away mid-body (reset, incomplete message)
    pub connection_reset: bool,
}

/// Request body, buffered in the background while dispatch continues
#[derive(Clone, Debug)]
pub struct PostBody {
    promise: Promise<Result<Bytes, BodyError>>,
}

impl PostBody {
    /// An already-buffered body
    pub fn ready(body: impl Into<Bytes>) -> Self {
        let (completer, promise) = deferred();
        completer.complete(Ok(body.into()));
        Self { promise }
    }

    /// Start collecting `body` on a spawned task
    pub fn spawn<B>(body: B) -> Self
    where
        B: hyper::body::Body + Send + 'static,
        B::Data: Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (completer, promise) = deferred();
        tokio::spawn(async move {
            let result = match body.collect().await {
                Ok(collected) => Ok(collected.to_bytes()),
                Err(e) => {
                    let connection_reset = is_reset_error(&e);
                    if connection_reset {
                        tracing::debug!(error = %e, "request body interrupted by peer");
                    } else {
                        tracing::warn!(error = %e, "failed to buffer request body");
                    }
                    Err(BodyError {
                        message: e.to_string(),
                        connection_reset,
                    })
                }
            };
            completer.complete(result);
        });
        Self { promise }
    }

    /// Wait for the whole body
    pub async fn bytes(&self) -> Result<Bytes, BodyError> {
        match self.promise.clone().await {
            Some(result) => result,
            None => Err(BodyError {
                message: "body reader went away".to_string(),
                connection_reset: true,
            }),
        }
    }
}

fn is_reset_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() || hyper_err.is_closed() {
                return true;
            }
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// HTTP Request as seen by waiters and route handlers
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    body: PostBody,
}

impl Request {
    /// Create a new request with an empty body
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: SmallVec::new(),
            body: PostBody::ready(Bytes::new()),
        }
    }

    /// Convert a hyper request, starting body buffering in the background
    pub fn from_hyper<B>(req: hyper::Request<B>) -> Self
    where
        B: hyper::body::Body + Send + 'static,
        B::Data: Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();
        let mut request = Request::new(parts.method, parts.uri.path());
        request.query = parts.uri.query().map(|s| s.to_string());

        for (name, value) in parts.headers.iter() {
            if let Ok(v) = value.to_str() {
                request.headers.push((name.to_string(), v.to_string()));
            }
        }

        request.body = PostBody::spawn(body);
        request
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Normalized pathname, dot segments resolved
    pub fn pathname(&self) -> String {
        normalize_pathname(&self.path)
    }

    /// Key used for every per-path override: pathname plus `?query`
    pub fn lookup_key(&self) -> String {
        let mut key = self.pathname();
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            key.push('?');
            key.push_str(query);
        }
        key
    }

    /// The buffered request body
    pub async fn post_body(&self) -> Result<Bytes, BodyError> {
        self.body.bytes().await
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    /// Set query string
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = Some(query.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = PostBody::ready(body);
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}

/// Resolve `.` and `..` segments the way a URL parser does
pub fn normalize_pathname(path: &str) -> String {
    if !path.starts_with('/') {
        return normalize_pathname(&format!("/{}", path));
    }

    let mut segments: Vec<&str> = Vec::new();
    let raw: Vec<&str> = path[1..].split('/').collect();
    let last = raw.len() - 1;

    for (i, segment) in raw.iter().enumerate() {
        match *segment {
            "." | "%2e" | "%2E" => {
                if i == last {
                    segments.push("");
                }
            }
            ".." | ".%2e" | ".%2E" | "%2e." | "%2E." | "%2e%2e" | "%2E%2E" => {
                segments.pop();
                if i == last {
                    segments.push("");
                }
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(path.len());
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
