//! # Voice Duplex Client
//!
//! Streams microphone audio to a remote speech service over a WebSocket and
//! plays the service's synthesized reply, with barge-in interruption.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        SESSION TASK (single loop)                    │
//! │                                                                      │
//! │  ┌────────────┐  blocks   ┌──────────────────┐  frames  ┌──────────┐ │
//! │  │ Microphone │ ────────▶ │ Capture Pipeline │ ───────▶ │ Transport│ │
//! │  │ (cpal thr) │  16 kHz   │ resample+encode  │  PCM16   │ (ws)     │ │
//! │  └────────────┘           └──────────────────┘          └────┬─────┘ │
//! │                                                              │       │
//! │        ┌─────────────────────────────────────────────────────┘       │
//! │        │ inbound: PCM16 24 kHz chunks | {"action":"interrupt_..."}   │
//! │        ▼                                                             │
//! │  ┌──────────────────┐  render(id)  ┌───────────┐                     │
//! │  │ Playback Queue   │ ───────────▶ │ Speaker   │                     │
//! │  │ FIFO + 1 slot    │ ◀─────────── │ (cpal thr)│                     │
//! │  └──────────────────┘  completed   └───────────┘                     │
//! │                                                                      │
//! │  Session Controller: Idle → Connecting → Listening → Stopping → Idle │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Device threads and socket tasks only post events; all session state is
//! mutated from the one session task.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate of microphone audio sent to the service
    pub const INPUT_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of synthesized audio received from the service
    pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

    /// Samples per captured block (~256 ms at 16 kHz)
    pub const MIC_BUFFER_SIZE: usize = 4096;

    /// Gain applied to synthesized audio on playback
    pub const DEFAULT_PLAYBACK_GAIN: f32 = 0.8;

    /// Default speech service endpoint
    pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/listen";

    /// Captured blocks that may wait for the session loop before new ones are dropped
    pub const BLOCK_QUEUE_CAPACITY: usize = 8;

    /// How long to wait for a device thread to report its stream running
    pub const DEVICE_READY_TIMEOUT_MS: u64 = 5_000;
}
