//! Manually completable single-result futures
//!
//! A deferred value pairs a [`Completer`] with a cloneable [`Promise`]:
//! - the completer may be cloned and stored in several places, but only the
//!   first `complete` call delivers a value
//! - every clone of the promise observes the same value
//! - if all completers are dropped without completing, the promise yields `None`

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Create a connected completer/promise pair
pub fn deferred<T>() -> (Completer<T>, Promise<T>)
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let completer = Completer {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    let promise = Promise {
        inner: rx.map(|r| r.ok()).boxed().shared(),
    };
    (completer, promise)
}

/// Write side of a deferred value
pub struct Completer<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Completer<T> {
    /// Deliver the value. Returns `false` if something already completed it.
    pub fn complete(&self, value: T) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                // A dropped receiver still counts as completed
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Whether a value has been delivered
    pub fn is_completed(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Read side of a deferred value
pub struct Promise<T>
where
    T: Clone,
{
    inner: Shared<BoxFuture<'static, Option<T>>>,
}

impl<T> Promise<T>
where
    T: Clone,
{
    /// The value, if it is already available
    pub fn peek(&self) -> Option<&T> {
        self.inner.peek().and_then(|v| v.as_ref())
    }

    /// Whether both promises observe the same deferred value
    pub fn same_as(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T> Clone for Promise<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Future for Promise<T>
where
    T: Clone,
{
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> std::fmt::Debug for Promise<T>
where
    T: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("ready", &self.inner.peek().is_some())
            .finish()
    }
}
