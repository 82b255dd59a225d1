//! PCM16 codec
//!
//! The wire format is raw little-endian 16-bit mono PCM in both
//! directions; only the declared rate differs.

pub mod decoder;
pub mod encoder;
pub mod frame;

pub use decoder::{from_fixed_point, PcmDecoder, PcmStats};
pub use encoder::{to_fixed_point, PcmEncoder};
pub use frame::EncodedFrame;
