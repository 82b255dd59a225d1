//! Microphone capture
//!
//! [`CapturePipeline`] turns captured blocks into outbound wire frames.
//! [`CpalCapture`] is the cpal-backed device feeding it, running its stream
//! on a dedicated thread.

use cpal::traits::{DeviceTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::audio::buffer::{AudioBlock, BlockAccumulator};
use crate::audio::device::{find_input_device, pick_config, BlockSender, CaptureDevice};
use crate::audio::resample::resample;
use crate::codec::PcmEncoder;
use crate::constants::DEVICE_READY_TIMEOUT_MS;
use crate::error::AudioError;
use crate::network::FrameSink;

/// Whether the pipeline forwards blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Active,
}

/// What happened to one captured block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Encoded and handed to the transport
    Sent { bytes: usize },
    /// Pipeline not active, or the block predates the current start
    Inactive,
    /// Transport not open; stale mic audio is dropped, never queued
    TransportClosed,
    /// Nothing left after resampling
    Empty,
}

/// Capture statistics
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub blocks_sent: u64,
    pub bytes_sent: u64,
    pub dropped_inactive: u64,
    pub dropped_closed: u64,
    pub empty_blocks: u64,
}

/// Capture → resample → encode → transport
pub struct CapturePipeline<C> {
    device: C,
    state: CaptureState,
    target_rate: u32,
    block_size: usize,
    /// Rate reported by the device at acquisition
    device_rate: Option<u32>,
    /// Bumped on every start; blocks stamped with an older value are stale
    epoch: u64,
    encoder: PcmEncoder,
    stats: CaptureStats,
}

impl<C: CaptureDevice> CapturePipeline<C> {
    pub fn new(device: C, target_rate: u32, block_size: usize) -> Self {
        Self {
            device,
            state: CaptureState::Idle,
            target_rate,
            block_size,
            device_rate: None,
            epoch: 0,
            encoder: PcmEncoder::new(target_rate),
            stats: CaptureStats::default(),
        }
    }

    /// Acquire the device and become Active. Does not retry on failure.
    ///
    /// Blocks delivered into `blocks` are stamped with a fresh capture
    /// period, so anything still queued from an earlier start is dropped.
    pub async fn start(&mut self, blocks: mpsc::Sender<AudioBlock>) -> Result<(), AudioError> {
        if self.state == CaptureState::Active {
            return Ok(());
        }

        self.epoch += 1;
        let sender = BlockSender::new(blocks, self.epoch);
        let rate = self.device.acquire(self.target_rate, self.block_size, sender).await?;
        if rate != self.target_rate {
            tracing::warn!(device_rate = rate, target_rate = self.target_rate, "capture rate differs, resampling");
        }

        self.device_rate = Some(rate);
        self.state = CaptureState::Active;
        tracing::info!(rate, block_size = self.block_size, "capture started");
        Ok(())
    }

    /// Deactivate and release the device. Safe in any state.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Active {
            tracing::info!(blocks_sent = self.stats.blocks_sent, "capture stopped");
        }
        self.state = CaptureState::Idle;
        self.device.release();
    }

    /// Process one captured block.
    ///
    /// Errors never escape: a block that cannot be encoded is dropped.
    pub fn process_block<S: FrameSink + ?Sized>(&mut self, block: AudioBlock, sink: &mut S) -> BlockOutcome {
        if self.state != CaptureState::Active || block.epoch() != self.epoch {
            self.stats.dropped_inactive += 1;
            return BlockOutcome::Inactive;
        }
        if !sink.is_open() {
            self.stats.dropped_closed += 1;
            tracing::trace!("transport not open, dropping capture block");
            return BlockOutcome::TransportClosed;
        }

        let block = resample(block, self.target_rate);
        if block.is_empty() {
            self.stats.empty_blocks += 1;
            return BlockOutcome::Empty;
        }

        match self.encoder.encode(block.samples()) {
            Ok(frame) => {
                let bytes = frame.byte_len();
                sink.send_frame(frame);
                self.stats.blocks_sent += 1;
                self.stats.bytes_sent += bytes as u64;
                BlockOutcome::Sent { bytes }
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping capture block");
                self.stats.empty_blocks += 1;
                BlockOutcome::Empty
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == CaptureState::Active
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn device_rate(&self) -> Option<u32> {
        self.device_rate
    }

    /// Capture period of the current (or most recent) start
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn device(&self) -> &C {
        &self.device
    }
}

/// cpal input stream owned by a dedicated thread
pub struct CpalCapture {
    /// Device identifier, `None` for the host default
    device_id: Option<String>,

    /// Whether the stream should keep delivering
    running: Arc<AtomicBool>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Blocks dropped because the session loop fell behind
    blocks_dropped: Arc<AtomicU64>,
}

impl CpalCapture {
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            device_id,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            blocks_dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Blocks dropped because the session loop fell behind
    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped.load(Ordering::Relaxed)
    }
}

impl CaptureDevice for CpalCapture {
    async fn acquire(&mut self, target_rate: u32, block_size: usize, blocks: BlockSender) -> Result<u32, AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(AudioError::StreamError("capture already running".to_string()));
        }

        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32, AudioError>>();
        let device_id = self.device_id.clone();
        // Fresh flag per stream so an abandoned thread cannot be revived
        self.running = Arc::new(AtomicBool::new(true));
        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let dropped = self.blocks_dropped.clone();

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let opened = find_input_device(device_id.as_deref()).and_then(|device| {
                    let ranges: Vec<_> = device
                        .supported_input_configs()
                        .map(|c| c.collect())
                        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
                    let config = pick_config(ranges, device.default_input_config().ok(), target_rate)?;
                    Ok((device, config))
                });
                let (device, config) = match opened {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let rate = config.sample_rate.0;
                let channels = config.channels as usize;
                let mut accumulator = BlockAccumulator::new(block_size, rate);

                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        accumulator.push_interleaved(data, channels, |block| {
                            if blocks.try_send(block).is_err() {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        });
                    },
                    |err| {
                        tracing::error!(error = %err, "audio capture error");
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, stopping capture
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        match tokio::time::timeout(Duration::from_millis(DEVICE_READY_TIMEOUT_MS), ready_rx).await {
            Ok(Ok(Ok(rate))) => Ok(rate),
            Ok(Ok(Err(e))) => {
                self.release();
                Err(e)
            }
            Ok(Err(_)) | Err(_) => {
                // The thread may still be opening the device; it exits on its own
                self.running.store(false, Ordering::SeqCst);
                self.thread_handle = None;
                Err(AudioError::DeviceUnavailable("capture device did not start".to_string()))
            }
        }
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn is_acquired(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.thread_handle.is_some()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.release();
    }
}
