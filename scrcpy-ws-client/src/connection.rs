//! WebSocket connection to the scrcpy bridge.
//!
//! The socket is split once: the write half becomes a [`ControlSender`]
//! for control messages, the read half a [`FrameReceiver`] that yields
//! whole binary messages in delivery order.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use scrcpy_ws_core::ScrcpyError;
use scrcpy_ws_core::input::ControlSink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── MessageSource ────────────────────────────────────────────────

/// Ordered source of inbound binary messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next binary message.
    ///
    /// `Ok(None)` means nothing to dispatch this round; closure is
    /// reported as [`ScrcpyError::TransportClosed`].
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, ScrcpyError>;
}

#[async_trait]
impl MessageSource for mpsc::Receiver<Bytes> {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, ScrcpyError> {
        match tokio::time::timeout(timeout, mpsc::Receiver::recv(self)).await {
            Ok(Some(data)) => Ok(Some(data)),
            Ok(None) => Err(ScrcpyError::TransportClosed("channel closed".into())),
            Err(_) => Ok(None),
        }
    }
}

// ── Connect ──────────────────────────────────────────────────────

/// Open the WebSocket and split it.
pub async fn connect(
    url: &str,
    timeout: Duration,
) -> Result<(ControlSender, FrameReceiver), ScrcpyError> {
    info!("connecting to {url}");
    let (ws, response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| ScrcpyError::Timeout(timeout))?
        .map_err(|e| ScrcpyError::TransportClosed(format!("connect failed: {e}")))?;
    debug!("handshake status {}", response.status());

    let (sink, stream) = ws.split();
    Ok((ControlSender { sink }, FrameReceiver { stream }))
}

// ── ControlSender ────────────────────────────────────────────────

/// Write half: each control message goes out as one binary frame.
pub struct ControlSender {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl ControlSink for ControlSender {
    async fn send_control(&mut self, message: Bytes) -> Result<(), ScrcpyError> {
        self.sink
            .send(WsMessage::Binary(message.to_vec()))
            .await
            .map_err(|e| ScrcpyError::TransportClosed(e.to_string()))
    }
}

// ── FrameReceiver ────────────────────────────────────────────────

/// Read half.
pub struct FrameReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl MessageSource for FrameReceiver {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, ScrcpyError> {
        let msg = match tokio::time::timeout(timeout, self.stream.next()).await {
            Err(_) => return Ok(None),
            Ok(None) => return Err(ScrcpyError::TransportClosed("stream ended".into())),
            Ok(Some(Err(e))) => return Err(ScrcpyError::TransportClosed(e.to_string())),
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            WsMessage::Binary(data) => Ok(Some(Bytes::from(data))),
            WsMessage::Text(text) => {
                debug!("skipping text message ({} bytes)", text.len());
                Ok(None)
            }
            WsMessage::Close(frame) => {
                let reason = frame
                    .map(|f| format!("closed by peer: {} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "closed by peer".into());
                Err(ScrcpyError::TransportClosed(reason))
            }
            // ping/pong replies are queued by tungstenite itself
            _ => Ok(None),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
