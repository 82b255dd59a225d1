//! Validated PCM16 frames as they travel over the wire

use bytes::{BufMut, Bytes, BytesMut};
use crate::error::CodecError;

/// Little-endian 16-bit mono PCM at a declared rate.
///
/// Byte length is always even and non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    data: Bytes,
    sample_rate: u32,
}

impl EncodedFrame {
    /// Wrap a raw payload, rejecting zero or odd byte lengths
    pub fn new(data: impl Into<Bytes>, sample_rate: u32) -> Result<Self, CodecError> {
        let data = data.into();
        if data.is_empty() || data.len() % 2 != 0 {
            return Err(CodecError::InvalidFrame { len: data.len() });
        }
        Ok(Self { data, sample_rate })
    }

    /// Serialize fixed-point samples
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Result<Self, CodecError> {
        let mut buf = BytesMut::with_capacity(samples.len() * 2);
        for &s in samples {
            buf.put_i16_le(s);
        }
        Self::new(buf.freeze(), sample_rate)
    }

    /// Fixed-point samples in payload order
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration in milliseconds
    pub fn duration_ms(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f32 * 1000.0 / self.sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_odd_and_empty() {
        assert_eq!(
            EncodedFrame::new(vec![1u8, 2, 3], 24_000),
            Err(CodecError::InvalidFrame { len: 3 })
        );
        assert_eq!(
            EncodedFrame::new(Vec::<u8>::new(), 24_000),
            Err(CodecError::InvalidFrame { len: 0 })
        );
        assert!(EncodedFrame::new(vec![1u8, 2, 3, 4], 24_000).is_ok());
    }

    #[test]
    fn test_little_endian_layout() {
        let frame = EncodedFrame::from_samples(&[1, -2, i16::MAX], 16_000).unwrap();
        assert_eq!(frame.as_bytes(), &[0x01, 0x00, 0xFE, 0xFF, 0xFF, 0x7F]);
        assert_eq!(frame.samples().collect::<Vec<_>>(), vec![1, -2, i16::MAX]);
        assert_eq!(frame.sample_count(), 3);
    }

    #[test]
    fn test_duration() {
        let frame = EncodedFrame::new(vec![0u8; 48_000], 24_000).unwrap();
        assert!((frame.duration_ms() - 1000.0).abs() < f32::EPSILON);
    }
}
