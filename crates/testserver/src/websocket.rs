//! WebSocket echo endpoint
//!
//! Every upgraded client gets a single `opened` text frame. After that the
//! session only answers pings and close frames.

use crate::state::ServerState;
use bytes::{Buf, Bytes, BytesMut};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::io;
use std::sync::Arc;
use testserver_core::{upgrade_response, Response, StatusCode, WebSocketFrame, WebSocketOpcode, ACKNOWLEDGEMENT};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Answer the handshake and run the session on a tracked task
pub(crate) fn accept(state: &Arc<ServerState>, mut req: hyper::Request<Incoming>) -> hyper::Response<Full<Bytes>> {
    let Some(response) = upgrade_response(req.headers()) else {
        return Response::new(StatusCode::BAD_REQUEST).into_hyper();
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    let session_state = state.clone();
    let id = state.tracker.spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::debug!(error = %e, "websocket upgrade failed");
                return;
            }
        };
        if let Err(e) = session(TokioIo::new(upgraded)).await {
            if crate::tracker::is_benign_io_error(&e) {
                tracing::debug!(error = %e, "websocket closed");
            } else {
                session_state.record_fatal(e.into());
            }
        }
    });
    tracing::debug!(session = id, "websocket accepted");

    response.into_hyper()
}

/// Acknowledge the client, then drain frames until close or EOF
pub(crate) async fn session<S>(mut stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&WebSocketFrame::text(ACKNOWLEDGEMENT).encode())
        .await?;

    let mut buf = BytesMut::with_capacity(4096);
    loop {
        loop {
            let (frame, used) = match WebSocketFrame::decode(&buf) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "closing websocket after bad frame");
                    stream
                        .write_all(&WebSocketFrame::close(e.close_code(), "").encode())
                        .await?;
                    stream.shutdown().await?;
                    return Ok(());
                }
            };
            buf.advance(used);
            match frame.opcode {
                WebSocketOpcode::Ping => {
                    stream.write_all(&WebSocketFrame::pong(frame.payload).encode()).await?;
                }
                WebSocketOpcode::Close => {
                    stream.write_all(&WebSocketFrame::close(1000, "").encode()).await?;
                    stream.shutdown().await?;
                    return Ok(());
                }
                _ => {}
            }
        }

        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_frame(client: &mut tokio::io::DuplexStream, buf: &mut BytesMut) -> WebSocketFrame {
        loop {
            if let Some((frame, used)) = WebSocketFrame::decode(buf).unwrap() {
                buf.advance(used);
                return frame;
            }
            assert!(client.read_buf(buf).await.unwrap() > 0, "stream closed early");
        }
    }

    #[tokio::test]
    async fn test_session_acknowledges_and_closes() {
        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(session(server));
        let mut buf = BytesMut::new();

        let hello = read_frame(&mut client, &mut buf).await;
        assert_eq!(hello.opcode, WebSocketOpcode::Text);
        assert_eq!(hello.payload, b"opened");

        let ping = WebSocketFrame {
            fin: true,
            opcode: WebSocketOpcode::Ping,
            mask: None,
            payload: b"are you there".to_vec(),
        };
        client.write_all(&ping.masked([9, 8, 7, 6]).encode()).await.unwrap();
        let pong = read_frame(&mut client, &mut buf).await;
        assert_eq!(pong.opcode, WebSocketOpcode::Pong);
        assert_eq!(pong.payload, b"are you there");

        client
            .write_all(&WebSocketFrame::text("ignored").masked([1, 2, 3, 4]).encode())
            .await
            .unwrap();
        client
            .write_all(&WebSocketFrame::close(1000, "bye").masked([1, 2, 3, 4]).encode())
            .await
            .unwrap();
        let close = read_frame(&mut client, &mut buf).await;
        assert_eq!(close.opcode, WebSocketOpcode::Close);

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_session_closes_on_oversized_frame() {
        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(session(server));
        let mut buf = BytesMut::new();
        read_frame(&mut client, &mut buf).await;

        let mut huge = vec![0x82, 0xFF];
        huge.extend_from_slice(&u64::MAX.to_be_bytes());
        huge.extend_from_slice(&[1, 2, 3, 4]);
        client.write_all(&huge).await.unwrap();

        let close = read_frame(&mut client, &mut buf).await;
        assert_eq!(close.opcode, WebSocketOpcode::Close);
        assert_eq!(&close.payload[..2], &1009u16.to_be_bytes());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_session_closes_on_unknown_opcode() {
        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(session(server));
        let mut buf = BytesMut::new();
        read_frame(&mut client, &mut buf).await;

        client.write_all(&[0x8B, 0x80, 0, 0, 0, 0]).await.unwrap();

        let close = read_frame(&mut client, &mut buf).await;
        assert_eq!(close.opcode, WebSocketOpcode::Close);
        assert_eq!(&close.payload[..2], &1002u16.to_be_bytes());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_session_ends_on_eof() {
        let (client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(session(server));
        drop(client);
        // The acknowledgement write may fail once the peer is gone
        let _ = task.await.unwrap();
    }
}
