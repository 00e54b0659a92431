//! testserver: in-process HTTP/HTTPS/WebSocket fixture server
//!
//! Serves a directory of test assets on an ephemeral port and lets a test
//! override individual paths:
//! - route handlers and redirects
//! - Basic auth challenges
//! - `Content-Security-Policy` headers
//! - gzip encoding and HTTP caching headers
//!
//! A test can also wait for a request to arrive, and `reset` everything
//! between cases. WebSocket upgrades on the same port receive a single
//! `opened` text frame.
//!
//! The library logs through `tracing` and never installs a subscriber.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod config;
mod dispatch;
mod overrides;
mod server;
mod state;
mod tls;
mod tracker;
mod waiters;
mod websocket;
mod writer;

pub use config::ServerConfig;
pub use overrides::{route_handler, RouteHandler};
pub use server::TestServer;
pub use tls::TlsConfig;
pub use waiters::RequestWaiter;
pub use writer::ResponseWriter;

// Re-exports
pub use testserver_core::{
    BasicCredentials, BodyError, Error, Method, Request, RequestBuilder, Response, ResponseBuilder,
    Result, StatusCode,
};
