//! Audio device providers and enumeration
//!
//! The session drives devices through [`CaptureDevice`] and
//! [`PlaybackDevice`]. Device threads never touch session state: they post
//! captured blocks and render events into channels read by the session loop.

use cpal::traits::{DeviceTrait, HostTrait};
use tokio::sync::mpsc;

use super::buffer::AudioBlock;
use crate::error::AudioError;

/// Channel carrying captured blocks to the session loop.
///
/// Every block is stamped with the capture period it was recorded in, so
/// blocks still queued from before a stop are recognisable after a restart.
#[derive(Debug, Clone)]
pub struct BlockSender {
    tx: mpsc::Sender<AudioBlock>,
    epoch: u64,
}

impl BlockSender {
    pub fn new(tx: mpsc::Sender<AudioBlock>, epoch: u64) -> Self {
        Self { tx, epoch }
    }

    /// Queue a block without waiting; fails when the loop has fallen behind
    pub fn try_send(&self, block: AudioBlock) -> Result<(), mpsc::error::TrySendError<AudioBlock>> {
        self.tx.try_send(block.with_epoch(self.epoch))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Channel carrying render events to the session loop
pub type RenderEventSender = mpsc::UnboundedSender<RenderEvent>;

/// Identifies one render handed to a playback device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderId(pub u64);

/// Signals from the playback device
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// The render reached the end of its samples
    Completed(RenderId),
    /// The render could not continue
    Failed { id: RenderId, reason: String },
    /// The output device became ready after being unavailable
    DeviceReady,
}

/// Microphone provider
#[allow(async_fn_in_trait)]
pub trait CaptureDevice {
    /// Acquire the device and begin delivering `block_size`-sample mono
    /// blocks into `blocks`. Returns the rate the device actually runs at,
    /// which may differ from `target_rate`. Waiting for the device does not
    /// block the caller's runtime.
    async fn acquire(&mut self, target_rate: u32, block_size: usize, blocks: BlockSender) -> Result<u32, AudioError>;

    /// Stop delivering blocks and release the device. Safe to call twice.
    fn release(&mut self);

    fn is_acquired(&self) -> bool;
}

/// Speaker provider with a single render slot
#[allow(async_fn_in_trait)]
pub trait PlaybackDevice {
    /// Open the output device. Completion and failure of renders are
    /// reported on `events`. Idempotent once ready.
    async fn acquire(&mut self, events: RenderEventSender) -> Result<(), AudioError>;

    /// Whether a render can start right now
    fn is_ready(&self) -> bool;

    /// Begin rendering `samples` (mono, at `sample_rate`) under `id`
    fn start_render(&mut self, id: RenderId, samples: Vec<f32>, sample_rate: u32) -> Result<(), AudioError>;

    /// Stop the active render immediately. No completion is reported for it.
    fn halt(&mut self);

    /// Close the output device. Safe to call twice.
    fn release(&mut self);
}

/// Description of a host audio device
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, true);
                devices.push(AudioDeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, false);
                devices.push(AudioDeviceInfo {
                    id: format!("output:{}", name),
                    is_default: default_output_name.as_ref() == Some(&name),
                    name,
                    is_input: false,
                    is_output: true,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Speech-relevant rates a device supports, and its channel counts
fn get_device_capabilities(device: &cpal::Device, is_input: bool) -> (Vec<u32>, Vec<u16>) {
    let configs: Vec<cpal::SupportedStreamConfigRange> = if is_input {
        device.supported_input_configs().map(|c| c.collect()).unwrap_or_default()
    } else {
        device.supported_output_configs().map(|c| c.collect()).unwrap_or_default()
    };

    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();
    for config in &configs {
        for rate_val in [16_000u32, 24_000, 44_100, 48_000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= config.min_sample_rate() && rate <= config.max_sample_rate() && !sample_rates.contains(&rate_val) {
                sample_rates.push(rate_val);
            }
        }
        if !channels.contains(&config.channels()) {
            channels.push(config.channels());
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Resolve an input device by id (`input:<name>` or bare name), or the
/// host default when `id` is `None`
pub fn find_input_device(id: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match id {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string())),
        Some(id) => {
            let name = id.strip_prefix("input:").unwrap_or(id);
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            find_by_name(devices, name).ok_or_else(|| AudioError::DeviceUnavailable(id.to_string()))
        }
    }
}

/// Resolve an output device by id (`output:<name>` or bare name), or the
/// host default when `id` is `None`
pub fn find_output_device(id: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match id {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string())),
        Some(id) => {
            let name = id.strip_prefix("output:").unwrap_or(id);
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            find_by_name(devices, name).ok_or_else(|| AudioError::DeviceUnavailable(id.to_string()))
        }
    }
}

fn find_by_name(devices: impl Iterator<Item = cpal::Device>, name: &str) -> Option<cpal::Device> {
    devices.into_iter().find(|d| d.name().map(|n| n == name).unwrap_or(false))
}

/// Pick a stream config at `rate`, preferring mono, falling back to stereo
/// and finally to the device default (whose rate the caller must honor)
pub(crate) fn pick_config(
    ranges: Vec<cpal::SupportedStreamConfigRange>,
    default: Option<cpal::SupportedStreamConfig>,
    rate: u32,
) -> Result<cpal::StreamConfig, AudioError> {
    let wanted = cpal::SampleRate(rate);
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        c.sample_format() == cpal::SampleFormat::F32 && c.min_sample_rate() <= wanted && c.max_sample_rate() >= wanted
    };

    if let Some(range) = ranges
        .iter()
        .filter(in_range)
        .find(|c| c.channels() == 1)
        .or_else(|| ranges.iter().filter(in_range).find(|c| c.channels() == 2))
    {
        return Ok(range.clone().with_sample_rate(wanted).config());
    }

    match default {
        Some(config) if config.sample_format() == cpal::SampleFormat::F32 => Ok(config.config()),
        Some(config) => Err(AudioError::UnsupportedFormat(format!("{:?}", config.sample_format()))),
        None => Err(AudioError::UnsupportedFormat("no usable stream config".to_string())),
    }
}
