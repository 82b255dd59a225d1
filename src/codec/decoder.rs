//! PCM16 to float decoder
//!
//! Also computes per-frame level statistics, logged at debug level so a
//! silent or broken response stream is easy to spot.

use super::frame::EncodedFrame;
use crate::error::CodecError;

/// Convert fixed-point samples back to normalized floats.
pub fn from_fixed_point(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Level statistics for one decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct PcmStats {
    pub min: i16,
    pub max: i16,
    pub mean: f32,
    /// Samples whose magnitude exceeds 0.0001 after normalization
    pub non_silent: usize,
    pub len: usize,
}

impl PcmStats {
    pub fn measure(samples: &[i16]) -> Self {
        let mut min = samples.first().copied().unwrap_or(0);
        let mut max = min;
        let mut sum = 0i64;
        let mut non_silent = 0;

        for &s in samples {
            min = min.min(s);
            max = max.max(s);
            sum += s as i64;
            if (s as f32 / 32768.0).abs() > 0.0001 {
                non_silent += 1;
            }
        }

        Self {
            min,
            max,
            mean: if samples.is_empty() { 0.0 } else { sum as f32 / samples.len() as f32 },
            non_silent,
            len: samples.len(),
        }
    }

    pub fn is_all_zero(&self) -> bool {
        self.len > 0 && self.min == 0 && self.max == 0
    }

    /// Fewer than 1% audible samples in a frame of more than 100
    pub fn is_very_quiet(&self) -> bool {
        self.len > 100 && (self.non_silent as f32) < self.len as f32 * 0.01
    }
}

/// PCM16 decoder for inbound synthesized audio
pub struct PcmDecoder {
    sample_rate: u32,
    /// Frames decoded
    frames_decoded: u64,
    /// Frames rejected
    frames_failed: u64,
    /// Total samples produced
    samples_produced: u64,
}

impl PcmDecoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_decoded: 0,
            frames_failed: 0,
            samples_produced: 0,
        }
    }

    /// Decode a frame to normalized samples.
    ///
    /// A frame declared at a different rate than the decoder's is a
    /// `DecodeFailure`; the caller skips it.
    pub fn decode(&mut self, frame: &EncodedFrame) -> Result<Vec<f32>, CodecError> {
        if frame.sample_rate() != self.sample_rate {
            self.frames_failed += 1;
            return Err(CodecError::DecodeFailure(format!(
                "frame declared at {} Hz, decoder expects {} Hz",
                frame.sample_rate(),
                self.sample_rate
            )));
        }

        let pcm: Vec<i16> = frame.samples().collect();
        let stats = PcmStats::measure(&pcm);
        tracing::debug!(
            samples = stats.len,
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            non_silent = stats.non_silent,
            "decoded response frame"
        );
        if stats.is_all_zero() {
            tracing::warn!(samples = stats.len, "response frame is all zeros");
        } else if stats.is_very_quiet() {
            tracing::warn!(samples = stats.len, non_silent = stats.non_silent, "response frame is very quiet");
        }

        let samples = from_fixed_point(&pcm);
        self.frames_decoded += 1;
        self.samples_produced += samples.len() as u64;
        Ok(samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_failed: self.frames_failed,
            samples_produced: self.samples_produced,
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_failed: u64,
    pub samples_produced: u64,
}
