//! testserver-core: protocol pieces of the fixture server
//!
//! Everything here works without a listening socket:
//! - request/response types and the per-path lookup key
//! - single-result deferred values
//! - Basic auth, gzip and HTTP cache headers
//! - static file resolution and the WebSocket handshake/frame codec

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod auth;
pub mod cache;
pub mod compress;
pub mod deferred;
pub mod error;
pub mod handlers;
pub mod request;
pub mod response;

// Re-exports
pub use auth::BasicCredentials;
pub use cache::CacheDecision;
pub use deferred::{deferred, Completer, Promise};
pub use error::{Error, Result};
pub use http::{Method, StatusCode};
pub use request::{BodyError, PostBody, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder};

pub use handlers::{
    content_type, generate_accept_key, is_websocket_upgrade, upgrade_response, Frame as WebSocketFrame,
    FrameError as WebSocketFrameError, Opcode as WebSocketOpcode, ServeOptions, StaticFileConfig,
    StaticFiles, ACKNOWLEDGEMENT,
};
