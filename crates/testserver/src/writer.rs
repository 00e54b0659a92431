//! Response writers handed to route handlers, and the in-flight set that
//! lets reset abort them

use crate::state::ServerState;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use testserver_core::{deferred, Completer, Promise, Request, Response, StatusCode};

/// How a response ended
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Write this response
    Send(Response),
    /// Drop the connection without a response
    Abort,
}

/// Every response that has not finished yet
#[derive(Default)]
pub(crate) struct InFlight {
    next_id: u64,
    pending: HashMap<u64, Completer<Reply>>,
}

impl InFlight {
    fn open(&mut self) -> (u64, Completer<Reply>, Promise<Reply>) {
        let id = self.next_id;
        self.next_id += 1;
        let (completer, promise) = deferred();
        self.pending.insert(id, completer.clone());
        (id, completer, promise)
    }

    fn finish(&mut self, id: u64) {
        self.pending.remove(&id);
    }

    /// Abort every unfinished response. Returns how many were aborted.
    pub(crate) fn abort_all(&mut self) -> usize {
        let mut aborted = 0;
        for (_, completer) in self.pending.drain() {
            if completer.complete(Reply::Abort) {
                aborted += 1;
            }
        }
        aborted
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Write side of one HTTP response.
///
/// The response is sent when [`end`](Self::end) or [`send`](Self::send) is
/// called. A writer dropped without finishing leaves the request pending
/// until the server is reset or stopped.
pub struct ResponseWriter {
    id: u64,
    completer: Completer<Reply>,
    state: Arc<ServerState>,
    response: Response,
}

impl ResponseWriter {
    /// Register a new in-flight response
    pub(crate) fn open(state: &Arc<ServerState>) -> (Self, Promise<Reply>) {
        let (id, completer, promise) = state.tables.lock().in_flight.open();
        let writer = Self {
            id,
            completer,
            state: state.clone(),
            response: Response::ok(),
        };
        (writer, promise)
    }

    /// Set the status code
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.response.status = status;
        self
    }

    /// Current status code
    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    /// Header set so far
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    /// Whether the response was already sent or aborted
    pub fn is_finished(&self) -> bool {
        self.completer.is_completed()
    }

    /// Send the status and headers set so far with `body`
    pub fn end(mut self, body: impl Into<Bytes>) {
        let mut response = std::mem::take(&mut self.response);
        response.body = body.into();
        self.finish(Reply::Send(response));
    }

    /// Send a prepared response, discarding anything set on the writer
    pub fn send(self, response: Response) {
        self.finish(Reply::Send(response));
    }

    /// Terminate the connection without a response
    pub fn abort(self) {
        self.finish(Reply::Abort);
    }

    /// Answer with the default static file behaviour for `pathname`
    pub async fn serve_file(self, req: &Request, pathname: &str) {
        let state = self.state.clone();
        state.serve_file(req, self, pathname).await;
    }

    /// Handle that can abort this response after the writer has moved
    /// into a handler task
    pub(crate) fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            id: self.id,
            completer: self.completer.clone(),
            state: self.state.clone(),
        }
    }

    fn finish(self, reply: Reply) {
        if !self.completer.complete(reply) {
            tracing::debug!(id = self.id, "response already finished, write ignored");
        }
        self.state.tables.lock().in_flight.finish(self.id);
    }
}

/// Aborts a response whose writer was lost, e.g. to a panicking handler
pub(crate) struct AbortHandle {
    id: u64,
    completer: Completer<Reply>,
    state: Arc<ServerState>,
}

impl AbortHandle {
    /// Abort the response unless it already finished. Returns whether it did.
    pub(crate) fn abort(self) -> bool {
        let aborted = self.completer.complete(Reply::Abort);
        self.state.tables.lock().in_flight.finish(self.id);
        aborted
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("id", &self.id)
            .field("status", &self.response.status)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerState;

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState::new(std::env::temp_dir()))
    }

    #[tokio::test]
    async fn test_end_sends_response() {
        let state = state();
        let (mut writer, reply) = ResponseWriter::open(&state);
        assert_eq!(state.tables.lock().in_flight.len(), 1);

        writer.set_status(StatusCode::NOT_FOUND).set_header("X-Fixture", "1");
        writer.end("gone");

        match reply.await {
            Some(Reply::Send(res)) => {
                assert_eq!(res.status, StatusCode::NOT_FOUND);
                assert_eq!(res.header("x-fixture"), Some("1"));
                assert_eq!(res.body_string().as_deref(), Some("gone"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(state.tables.lock().in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_abort_all_skips_finished() {
        let state = state();
        let (done, _done_reply) = ResponseWriter::open(&state);
        let (pending, pending_reply) = ResponseWriter::open(&state);
        done.end("ok");

        assert_eq!(state.tables.lock().in_flight.abort_all(), 1);
        assert!(pending.is_finished());
        assert!(matches!(pending_reply.await, Some(Reply::Abort)));

        // Writing after an abort is inert
        pending.end("late");
        assert_eq!(state.tables.lock().in_flight.len(), 0);
    }

    #[tokio::test]
    async fn test_abort_handle_outlives_writer() {
        let state = state();
        let (writer, reply) = ResponseWriter::open(&state);
        let handle = writer.abort_handle();
        drop(writer);

        assert!(handle.abort());
        assert!(matches!(reply.await, Some(Reply::Abort)));
        assert_eq!(state.tables.lock().in_flight.len(), 0);

        let (writer, _reply) = ResponseWriter::open(&state);
        let handle = writer.abort_handle();
        writer.end("done");
        assert!(!handle.abort());
    }
}
