//! Float to PCM16 encoder
//!
//! The scaling is asymmetric (negative ×32768, non-negative ×32767) and
//! truncates toward zero. The service decodes with the same convention, so
//! it must not be changed to rounding.

use super::frame::EncodedFrame;
use crate::error::CodecError;

/// Convert normalized samples to fixed point.
pub fn to_fixed_point(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// PCM16 encoder for outbound microphone audio
pub struct PcmEncoder {
    sample_rate: u32,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode a block of samples into a wire frame.
    ///
    /// Fails with `InvalidFrame` on empty input.
    pub fn encode(&mut self, samples: &[f32]) -> Result<EncodedFrame, CodecError> {
        let frame = EncodedFrame::from_samples(&to_fixed_point(samples), self.sample_rate)?;

        self.frames_encoded += 1;
        self.bytes_produced += frame.byte_len() as u64;

        Ok(frame)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}
