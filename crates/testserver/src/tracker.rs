//! Connection tracking and connection error triage
//!
//! Every accepted connection and every upgraded WebSocket session runs as a
//! tracked task, so `stop` can tear all of them down without waiting for
//! idle keep-alive sockets.

use crate::dispatch::ResponseAborted;
use crate::state::ServerState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use testserver_core::Error;
use tokio::task::AbortHandle;

/// Tracks open connections for forced shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    next_id: AtomicU64,
    /// Shutdown signal received
    shutting_down: AtomicBool,
    tasks: Mutex<HashMap<u64, AbortHandle>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` as a tracked task. The task removes itself on exit.
    pub fn spawn<F>(self: &Arc<Self>, future: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tracker = self.clone();

        // Insert before the task can observe the map
        let mut tasks = self.tasks.lock();
        let handle = tokio::spawn(async move {
            future.await;
            tracker.tasks.lock().remove(&id);
        });
        tasks.insert(id, handle.abort_handle());
        id
    }

    /// Number of open connections and sessions
    #[inline]
    pub fn count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Abort every tracked task. Returns how many were open.
    pub fn destroy_all(&self) -> usize {
        let tasks: Vec<_> = self.tasks.lock().drain().collect();
        for (_, handle) in &tasks {
            handle.abort();
        }
        tasks.len()
    }

    /// Signal that shutdown is in progress
    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown is in progress
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// How loudly a connection error should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    /// Transport noise: resets, early closes, aborted responses
    Benign,
    /// The client sent something that is not HTTP/1.1
    Malformed,
    /// Anything else
    Fatal,
}

pub(crate) fn classify(err: &hyper::Error) -> Severity {
    if err.is_incomplete_message()
        || err.is_canceled()
        || err.is_closed()
        || err.is_body_write_aborted()
        || err.is_timeout()
        || has_benign_source(err)
    {
        return Severity::Benign;
    }
    if err.is_parse() {
        return Severity::Malformed;
    }
    Severity::Fatal
}

fn has_benign_source(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<ResponseAborted>() {
            return true;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_benign_io_error(io_err) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Socket errors produced by clients going away
pub(crate) fn is_benign_io_error(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    if matches!(
        err.kind(),
        ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof | NotConnected
    ) {
        return true;
    }
    #[cfg(feature = "tls")]
    if crate::tls::is_benign_tls_error(err) {
        return true;
    }
    false
}

/// Log a finished connection's error at the level it deserves
pub(crate) fn report_connection_error(state: &ServerState, peer: SocketAddr, err: hyper::Error) {
    match classify(&err) {
        Severity::Benign => tracing::debug!(peer = %peer, error = %err, "connection closed"),
        Severity::Malformed => tracing::warn!(peer = %peer, error = %err, "malformed request"),
        Severity::Fatal => state.record_fatal(Error::Hyper(err.to_string())),
    }
}
