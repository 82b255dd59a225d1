//! WebSocket transport
//!
//! One writer task drains an outbound channel into the socket; one reader
//! task classifies inbound messages and posts them to the session loop.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::{FrameSink, Transport, TransportEvent, TransportEventSender};
use crate::codec::EncodedFrame;
use crate::error::NetworkError;
use crate::protocol::{classify_binary, classify_text};

/// Transport statistics
#[derive(Debug, Clone)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_dropped: u64,
}

/// Persistent WebSocket to the speech service
pub struct WsTransport {
    endpoint: String,
    open: Arc<AtomicBool>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reader: Option<JoinHandle<()>>,
    frames_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    frames_dropped: u64,
}

impl WsTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            open: Arc::new(AtomicBool::new(false)),
            outbound: None,
            reader: None,
            frames_sent: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            frames_dropped: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get statistics
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped,
        }
    }
}

impl FrameSink for WsTransport {
    fn is_open(&self) -> bool {
        self.outbound.is_some() && self.open.load(Ordering::SeqCst)
    }

    fn send_frame(&mut self, frame: EncodedFrame) {
        if !self.is_open() {
            self.frames_dropped += 1;
            return;
        }
        if let Some(outbound) = &self.outbound {
            if outbound.send(Message::Binary(frame.into_bytes().to_vec())).is_err() {
                self.frames_dropped += 1;
            }
        }
    }
}

impl Transport for WsTransport {
    async fn connect(&mut self, events: TransportEventSender) -> Result<(), NetworkError> {
        if self.is_open() {
            tracing::debug!(endpoint = %self.endpoint, "already connected");
            return Ok(());
        }
        self.close();
        if let Some(stale) = self.reader.take() {
            stale.abort();
        }

        tracing::info!(endpoint = %self.endpoint, "connecting");
        let (socket, _response) = tokio_tungstenite::connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        // Fresh flag per connection so tasks of an old socket cannot flip it
        self.open = Arc::new(AtomicBool::new(true));

        let open = self.open.clone();
        let frames_sent = self.frames_sent.clone();
        let bytes_sent = self.bytes_sent.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                let len = message.len();
                let binary = message.is_binary();
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "websocket send failed");
                    break;
                }
                if binary {
                    frames_sent.fetch_add(1, Ordering::Relaxed);
                    bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
                }
                if closing {
                    break;
                }
            }
            open.store(false, Ordering::SeqCst);
        });

        let open = self.open.clone();
        let reader = tokio::spawn(async move {
            let mut reason = None;
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        tracing::trace!(bytes = data.len(), "received audio");
                        if let Some(inbound) = classify_binary(data) {
                            let _ = events.send(TransportEvent::Inbound(inbound));
                        }
                    }
                    Ok(Message::Text(text)) => {
                        tracing::debug!(text = %text, "received text");
                        let _ = events.send(TransportEvent::Inbound(classify_text(&text)));
                    }
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }
            open.store(false, Ordering::SeqCst);
            tracing::info!(reason = reason.as_deref().unwrap_or(""), "websocket closed");
            let _ = events.send(TransportEvent::Closed { reason });
        });

        self.outbound = Some(outbound_tx);
        self.reader = Some(reader);
        tracing::info!(endpoint = %self.endpoint, "connected");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "session closed".into(),
            })));
        }
        // The writer exits after flushing the close frame; the reader keeps
        // running until the peer acknowledges, then reports the close.
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
