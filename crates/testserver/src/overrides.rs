//! Per-path overrides of the default static behaviour

use crate::writer::ResponseWriter;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use testserver_core::{BasicCredentials, Request};

/// Route handler type. The handler owns the response writer and is
/// responsible for finishing it.
pub type RouteHandler = Arc<
    dyn Fn(Request, ResponseWriter) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Box a closure into a [`RouteHandler`]
pub fn route_handler<F, Fut>(handler: F) -> RouteHandler
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |req, res| Box::pin(handler(req, res)))
}

/// The four override tables, keyed by lookup key
#[derive(Default)]
pub struct OverrideTable {
    routes: HashMap<String, RouteHandler>,
    auths: HashMap<String, BasicCredentials>,
    csp: HashMap<String, String>,
    gzip: HashSet<String>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_route(&mut self, path: impl Into<String>, handler: RouteHandler) {
        self.routes.insert(path.into(), handler);
    }

    pub fn route(&self, path: &str) -> Option<RouteHandler> {
        self.routes.get(path).cloned()
    }

    pub fn set_auth(&mut self, path: impl Into<String>, credentials: BasicCredentials) {
        self.auths.insert(path.into(), credentials);
    }

    pub fn auth(&self, path: &str) -> Option<&BasicCredentials> {
        self.auths.get(path)
    }

    pub fn set_csp(&mut self, path: impl Into<String>, value: impl Into<String>) {
        self.csp.insert(path.into(), value.into());
    }

    pub fn csp(&self, path: &str) -> Option<&str> {
        self.csp.get(path).map(|s| s.as_str())
    }

    pub fn enable_gzip(&mut self, path: impl Into<String>) {
        self.gzip.insert(path.into());
    }

    pub fn is_gzip(&self, path: &str) -> bool {
        self.gzip.contains(path)
    }

    /// Drop every override
    pub fn clear(&mut self) {
        self.routes.clear();
        self.auths.clear();
        self.csp.clear();
        self.gzip.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.auths.is_empty() && self.csp.is_empty() && self.gzip.is_empty()
    }
}
