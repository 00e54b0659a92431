//! Built-in request handlers

pub mod static_files;
pub mod websocket;

pub use static_files::{content_type, ServeOptions, StaticFileConfig, StaticFiles};
pub use websocket::{
    generate_accept_key, is_websocket_upgrade, upgrade_response, Frame, FrameError, Opcode, ACKNOWLEDGEMENT,
    MAX_PAYLOAD,
};
