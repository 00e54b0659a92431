//! Futures that resolve when a request for a given path arrives

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use testserver_core::{deferred, Completer, Error, Promise, Request, Result};

/// Rejection delivered to waiters on reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rejected;

type Outcome = std::result::Result<Request, Rejected>;

/// Resolves with the first request whose lookup key matches, or fails with
/// [`Error::Reset`] if the server is reset (or dropped) first.
///
/// Clones observe the same outcome.
#[derive(Clone, Debug)]
pub struct RequestWaiter {
    promise: Promise<Outcome>,
}

impl RequestWaiter {
    /// Whether both handles wait on the same registration
    pub fn same_as(&self, other: &RequestWaiter) -> bool {
        self.promise.same_as(&other.promise)
    }

    /// Whether the waiter has already been resolved or rejected
    pub fn is_settled(&self) -> bool {
        self.promise.peek().is_some()
    }
}

impl Future for RequestWaiter {
    type Output = Result<Request>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.promise).poll(cx).map(|outcome| match outcome {
            Some(Ok(request)) => Ok(request),
            Some(Err(Rejected)) | None => Err(Error::Reset),
        })
    }
}

struct Waiter {
    completer: Completer<Outcome>,
    promise: Promise<Outcome>,
}

/// At most one pending waiter per path
#[derive(Default)]
pub struct WaiterRegistry {
    pending: HashMap<String, Waiter>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing waiter for `path`, or a freshly registered one
    pub fn wait_for(&mut self, path: &str) -> RequestWaiter {
        let waiter = self.pending.entry(path.to_string()).or_insert_with(|| {
            let (completer, promise) = deferred();
            Waiter { completer, promise }
        });
        RequestWaiter {
            promise: waiter.promise.clone(),
        }
    }

    /// Remove the waiter for `path` and hand it the request
    pub fn resolve(&mut self, path: &str, request: &Request) -> bool {
        match self.pending.remove(path) {
            Some(waiter) => waiter.completer.complete(Ok(request.clone())),
            None => false,
        }
    }

    /// Fail and drop every pending waiter. Returns how many were pending.
    pub fn reject_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, waiter) in self.pending.drain() {
            waiter.completer.complete(Err(Rejected));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testserver_core::{Method, RequestBuilder};

    #[tokio::test]
    async fn test_resolves_once() {
        let mut registry = WaiterRegistry::new();
        let waiter = registry.wait_for("/one-style.html");

        let req = RequestBuilder::new(Method::GET, "/one-style.html").build();
        assert!(registry.resolve("/one-style.html", &req));
        assert!(!registry.resolve("/one-style.html", &req));
        assert!(registry.is_empty());

        let got = waiter.await.unwrap();
        assert_eq!(got.path, "/one-style.html");
    }

    #[test]
    fn test_duplicate_wait_returns_same_waiter() {
        let mut registry = WaiterRegistry::new();
        let first = registry.wait_for("/a");
        let second = registry.wait_for("/a");
        let other = registry.wait_for("/b");

        assert!(first.same_as(&second));
        assert!(!first.same_as(&other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_reject_all() {
        let mut registry = WaiterRegistry::new();
        let stale = registry.wait_for("/a");
        assert_eq!(registry.reject_all(), 1);
        assert_eq!(registry.reject_all(), 0);

        let err = stale.clone().await.unwrap_err();
        assert!(err.is_reset());
        assert_eq!(err.to_string(), "Static Server has been reset");
        assert!(stale.is_settled());

        let fresh = registry.wait_for("/a");
        assert!(!fresh.same_as(&stale));
        assert!(!fresh.is_settled());
    }
}
