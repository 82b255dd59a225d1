//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod playback;
pub mod resample;

pub use buffer::{AudioBlock, BlockAccumulator};
pub use capture::{BlockOutcome, CapturePipeline, CaptureState, CpalCapture};
pub use device::{list_devices, AudioDeviceInfo, CaptureDevice, PlaybackDevice, RenderEvent, RenderId};
pub use playback::{Advance, CpalPlayback, PlaybackQueue};
pub use resample::resample;
