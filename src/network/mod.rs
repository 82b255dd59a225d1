//! Network subsystem: the duplex connection to the speech service

pub mod websocket;

use tokio::sync::mpsc;

use crate::codec::EncodedFrame;
use crate::error::NetworkError;
use crate::protocol::InboundMessage;

pub use websocket::WsTransport;

/// Events posted by the transport to the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Inbound(InboundMessage),
    /// The connection ended, by either side
    Closed { reason: Option<String> },
}

/// Channel carrying transport events to the session loop
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Anything outbound frames can be written to
pub trait FrameSink {
    /// Whether the channel is open and writable
    fn is_open(&self) -> bool;

    /// Queue a frame for sending. A no-op when not open.
    fn send_frame(&mut self, frame: EncodedFrame);
}

/// Duplex connection lifecycle.
///
/// There is no automatic reconnect; callers retry explicitly.
#[allow(async_fn_in_trait)]
pub trait Transport: FrameSink {
    /// Open the connection, or do nothing if already open. Inbound
    /// messages and the eventual close are posted on `events`.
    async fn connect(&mut self, events: TransportEventSender) -> Result<(), NetworkError>;

    /// Close the connection. Safe to call when already closed.
    fn close(&mut self);
}
