//! Request dispatch: auth, waiters, routes, then static files

use crate::state::ServerState;
use crate::websocket;
use crate::writer::{Reply, ResponseWriter};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use std::sync::Arc;
use testserver_core::{is_websocket_upgrade, Error, Request};

/// Returned to hyper when a response was aborted, so the connection is
/// dropped instead of answered
#[derive(Debug, thiserror::Error)]
#[error("response aborted")]
pub struct ResponseAborted;

/// Main request handler
pub(crate) async fn handle_request(
    state: Arc<ServerState>,
    req: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, ResponseAborted> {
    if is_websocket_upgrade(req.headers()) {
        return Ok(websocket::accept(&state, req));
    }

    let (writer, reply) = ResponseWriter::open(&state);
    dispatch(&state, Request::from_hyper(req), writer);

    match reply.await {
        Some(Reply::Send(response)) => Ok(response.into_hyper()),
        Some(Reply::Abort) | None => Err(ResponseAborted),
    }
}

/// Route one request. The writer is finished by whoever ends up owning it.
pub(crate) fn dispatch(state: &Arc<ServerState>, request: Request, writer: ResponseWriter) {
    let key = request.lookup_key();
    tracing::debug!(method = %request.method, key = %key, "request");

    let (challenge, route) = {
        let mut guard = state.tables.lock();
        let tables = &mut *guard;

        let challenge = tables
            .overrides
            .auth(&key)
            .and_then(|credentials| credentials.challenge(&request));
        if challenge.is_some() {
            (challenge, None)
        } else {
            if tables.waiters.resolve(&key, &request) {
                tracing::debug!(key = %key, "waiter resolved");
            }
            (None, tables.overrides.route(&key))
        }
    };

    if let Some(unauthorized) = challenge {
        tracing::debug!(key = %key, "auth challenge");
        writer.send(unauthorized);
        return;
    }

    match route {
        Some(handler) => {
            let abort = writer.abort_handle();
            let task = tokio::spawn(handler(request, writer));
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        state.record_fatal(Error::Handler(format!("route {} panicked", key)));
                        abort.abort();
                    }
                }
            });
        }
        None => {
            let state = state.clone();
            let pathname = request.pathname();
            tokio::spawn(async move {
                state.serve_file(&request, writer, &pathname).await;
            });
        }
    }
}
