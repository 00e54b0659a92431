//! WebSocket handshake and frame codec (RFC 6455)

use crate::{Response, ResponseBuilder, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::HeaderMap;
use sha1::{Digest, Sha1};

/// Text frame sent to every accepted WebSocket client
pub const ACKNOWLEDGEMENT: &str = "opened";

/// Largest payload a peer may announce
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Frame the codec refuses to decode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload of {0} bytes exceeds the limit")]
    TooLarge(u64),

    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
}

impl FrameError {
    /// Close status code answering this error (RFC 6455 section 7.4.1)
    pub fn close_code(&self) -> u16 {
        match self {
            FrameError::TooLarge(_) => 1009,
            FrameError::UnknownOpcode(_) => 1002,
        }
    }
}

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte & 0x0F {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }
}

/// WebSocket frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a text frame
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            mask: None,
            payload: data.into().into_bytes(),
        }
    }

    /// Create a pong frame
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Pong,
            mask: None,
            payload: data.into(),
        }
    }

    /// Create a close frame
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());

        Self {
            fin: true,
            opcode: Opcode::Close,
            mask: None,
            payload,
        }
    }

    /// Mask the payload, as clients must
    pub fn masked(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 14);

        // First byte: FIN + opcode
        let first_byte = if self.fin { 0x80 } else { 0x00 } | (self.opcode as u8);
        buf.push(first_byte);

        // Second byte: MASK + payload length
        let len = self.payload.len();
        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };

        if len < 126 {
            buf.push(mask_bit | (len as u8));
        } else if len < 65536 {
            buf.push(mask_bit | 126);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            buf.push(mask_bit | 127);
            buf.extend_from_slice(&(len as u64).to_be_bytes());
        }

        if let Some(mask) = self.mask {
            buf.extend_from_slice(&mask);
            for (i, byte) in self.payload.iter().enumerate() {
                buf.push(byte ^ mask[i % 4]);
            }
        } else {
            buf.extend_from_slice(&self.payload);
        }

        buf
    }

    /// Decode one frame from the front of `data`.
    ///
    /// Returns the frame and the number of bytes consumed, or `Ok(None)`
    /// when more input is needed.
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, FrameError> {
        if data.len() < 2 {
            return Ok(None);
        }

        let fin = (data[0] & 0x80) != 0;
        let opcode = Opcode::from_u8(data[0]).ok_or(FrameError::UnknownOpcode(data[0] & 0x0F))?;
        let masked = (data[1] & 0x80) != 0;
        let mut payload_len = u64::from(data[1] & 0x7F);
        let mut offset = 2usize;

        if payload_len == 126 {
            if data.len() < 4 {
                return Ok(None);
            }
            payload_len = u64::from(u16::from_be_bytes([data[2], data[3]]));
            offset = 4;
        } else if payload_len == 127 {
            if data.len() < 10 {
                return Ok(None);
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&data[2..10]);
            payload_len = u64::from_be_bytes(len);
            offset = 10;
        }

        if payload_len > MAX_PAYLOAD as u64 {
            return Err(FrameError::TooLarge(payload_len));
        }
        // Bounded by MAX_PAYLOAD above
        let payload_len = payload_len as usize;

        let mask = if masked {
            if data.len() < offset + 4 {
                return Ok(None);
            }
            let mask = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
            offset += 4;
            Some(mask)
        } else {
            None
        };

        let end = offset
            .checked_add(payload_len)
            .ok_or(FrameError::TooLarge(payload_len as u64))?;
        if data.len() < end {
            return Ok(None);
        }

        let mut payload = data[offset..end].to_vec();
        if let Some(mask) = mask {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask[i % 4];
            }
        }

        let frame = Frame {
            fin,
            opcode,
            mask,
            payload,
        };

        Ok(Some((frame, end)))
    }
}

/// Check if request headers ask for a WebSocket upgrade
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");

    header("upgrade").eq_ignore_ascii_case("websocket")
        && header("connection").to_ascii_lowercase().contains("upgrade")
        && headers.contains_key("sec-websocket-key")
}

/// Generate WebSocket accept key
pub fn generate_accept_key(key: &str) -> String {
    const MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(MAGIC.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Create the 101 response completing the handshake
pub fn upgrade_response(headers: &HeaderMap) -> Option<Response> {
    let key = headers.get("sec-websocket-key")?.to_str().ok()?;
    let accept = generate_accept_key(key);

    Some(
        ResponseBuilder::new(StatusCode::SWITCHING_PROTOCOLS)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", accept)
            .build(),
    )
}
