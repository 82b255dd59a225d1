//! Wire protocol with the speech service
//!
//! - Client → service: binary, PCM16 LE mono 16 kHz, one message per block.
//! - Service → client: binary, PCM16 LE mono 24 kHz, arbitrary chunking.
//! - Service → client: text. `{"action":"interrupt_playback"}` is the
//!   barge-in signal; any other text is advisory.
//!
//! The client sends no text messages.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::codec::EncodedFrame;
use crate::constants::OUTPUT_SAMPLE_RATE;

/// Control tag that halts playback
pub const INTERRUPT_PLAYBACK: &str = "interrupt_playback";

/// Recognized control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    InterruptPlayback,
}

/// Advisory text from the service
#[derive(Debug, Clone, PartialEq)]
pub struct TextEvent {
    pub text: String,
    /// Whether the text parsed as JSON
    pub structured: bool,
    pub received_at: DateTime<Utc>,
}

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Audio(EncodedFrame),
    Control(ControlMessage),
    Text(TextEvent),
}

#[derive(Deserialize)]
struct ControlEnvelope {
    action: Option<String>,
}

/// Classify an inbound binary payload.
///
/// Empty payloads are ignored; odd lengths are rejected and logged.
pub fn classify_binary(data: impl Into<bytes::Bytes>) -> Option<InboundMessage> {
    let data = data.into();
    if data.is_empty() {
        return None;
    }

    match EncodedFrame::new(data, OUTPUT_SAMPLE_RATE) {
        Ok(frame) => Some(InboundMessage::Audio(frame)),
        Err(e) => {
            tracing::warn!(error = %e, "rejecting inbound audio payload");
            None
        }
    }
}

/// Classify an inbound text payload. Never fails.
pub fn classify_text(text: &str) -> InboundMessage {
    let structured = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => {
            let action = ControlEnvelope::deserialize(&value).ok().and_then(|env| env.action);
            if action.as_deref() == Some(INTERRUPT_PLAYBACK) {
                return InboundMessage::Control(ControlMessage::InterruptPlayback);
            }
            true
        }
        Err(_) => false,
    };

    InboundMessage::Text(TextEvent {
        text: text.to_string(),
        structured,
        received_at: Utc::now(),
    })
}
