// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bidirectional byte-stream bridge between an upgraded WebSocket and an
//! opaque backend implementing `AsyncRead + AsyncWrite` (§4.4). The
//! backend is abstract so the bundled local-TCP connector and a fake
//! in-memory backend in tests share the same bridging code; a real VNC
//! server presents the same shape over `127.0.0.1:{vnc_port}`.

use axum::extract::ws::{Message, WebSocket};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Connects to the local VNC endpoint recorded for a task.
pub async fn connect_local(port: u16) -> std::io::Result<tokio::net::TcpStream> {
    tokio::net::TcpStream::connect(("127.0.0.1", port)).await
}

/// Streams bytes bidirectionally between `socket` and `backend` until
/// either side closes.
pub async fn bridge<B>(mut socket: WebSocket, mut backend: B)
where
    B: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 16 * 1024];
    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if backend.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_))) => {}
                    Some(Err(e)) => {
                        debug!("VNC WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            result = backend.read(&mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        if socket.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("VNC backend read error: {e}");
                        break;
                    }
                }
            }
        }
    }
}
